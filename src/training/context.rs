//! Training context for the teacher/student promotion loop
//!
//! All mutable loop state lives in one explicit struct passed through the
//! loop: the frozen teacher, the active student with its optimizer and
//! schedule, and the stage descriptor. Roles are slots with move semantics.
//! The teacher slot holds the *inner-backend* model, so a promoted teacher
//! is structurally incapable of gradient updates and runs with inference
//! behavior (dropout off); the frozen invariant is re-established by
//! construction at every promotion.

use burn::module::AutodiffModule;
use burn::optim::adaptor::OptimizerAdaptor;
use burn::optim::{decay::WeightDecayConfig, Adam, AdamConfig};
use burn::tensor::backend::AutodiffBackend;

use crate::model::{Capacity, Classifier, GrowthSequence};
use crate::training::scheduler::LrSchedule;
use crate::utils::error::{Result, SslError};

/// Optimizer bound to a student model
pub type StudentOptimizer<B> =
    OptimizerAdaptor<Adam, Classifier<B>, B>;

/// Identifies the loop's current position: which promotion iteration is
/// running, which growth-sequence slot the student came from, and the batch
/// size that slot dictates. Mutated only at promotion boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageDescriptor {
    /// Promotion iteration index (0-based)
    pub iteration: usize,
    /// Index into the growth sequence the current student was built from
    pub capacity_index: usize,
    /// Batch size for this stage
    pub batch_size: usize,
}

impl StageDescriptor {
    /// Descriptor for the first student stage (growth slot 1; slot 0 is the
    /// warmup teacher).
    pub fn first_student(growth: &GrowthSequence, base_batch_size: usize) -> Result<Self> {
        let batch_size = growth.batch_size_at(1, base_batch_size).ok_or_else(|| {
            SslError::Config("growth sequence has no student capacity".to_string())
        })?;
        Ok(Self {
            iteration: 0,
            capacity_index: 1,
            batch_size,
        })
    }

    /// Descriptor for the stage after this one.
    pub fn next(&self, growth: &GrowthSequence, base_batch_size: usize) -> Result<Self> {
        let capacity_index = self.capacity_index + 1;
        let batch_size = growth
            .batch_size_at(capacity_index, base_batch_size)
            .ok_or_else(|| {
                SslError::Config(format!(
                    "growth sequence exhausted at capacity slot {}",
                    capacity_index
                ))
            })?;
        Ok(Self {
            iteration: self.iteration + 1,
            capacity_index,
            batch_size,
        })
    }

    /// Capacity of this stage's student
    pub fn capacity(&self, growth: &GrowthSequence) -> Option<Capacity> {
        growth.get(self.capacity_index)
    }
}

/// The actively trained model with its optimizer and schedule. Rebuilt
/// fresh at every promotion.
pub struct StudentState<B: AutodiffBackend> {
    pub model: Classifier<B>,
    pub optimizer: StudentOptimizer<B>,
    pub schedule: LrSchedule,
}

impl<B: AutodiffBackend> StudentState<B> {
    /// Build a student at the given capacity with a fresh optimizer and
    /// schedule.
    pub fn new(
        capacity: Capacity,
        num_classes: usize,
        schedule: LrSchedule,
        device: &B::Device,
    ) -> Self {
        let config = capacity.classifier_config(num_classes);
        let model = Classifier::new(&config, device);
        let optimizer = AdamConfig::new()
            .with_weight_decay(Some(WeightDecayConfig::new(1e-4)))
            .init();

        Self {
            model,
            optimizer,
            schedule,
        }
    }
}

/// Explicit state for the promotion loop: teacher slot, student slot,
/// stage descriptor, and the role-transition counters.
pub struct TrainingContext<B: AutodiffBackend> {
    /// Frozen teacher supplying pseudo-labels (inner backend, no autodiff)
    pub teacher: Classifier<B::InnerBackend>,
    student: Option<StudentState<B>>,
    /// Current stage; mutated only by [`TrainingContext::promote`]
    pub stage: StageDescriptor,
    students_created: usize,
    promotions: usize,
}

impl<B: AutodiffBackend> TrainingContext<B> {
    /// Create the context entering the first student stage.
    pub fn new(
        teacher: Classifier<B::InnerBackend>,
        student: StudentState<B>,
        stage: StageDescriptor,
    ) -> Self {
        Self {
            teacher,
            student: Some(student),
            stage,
            students_created: 1,
            promotions: 0,
        }
    }

    /// The active student, or an error after the final promotion.
    pub fn student_mut(&mut self) -> Result<&mut StudentState<B>> {
        self.student
            .as_mut()
            .ok_or_else(|| SslError::Training("no active student".to_string()))
    }

    /// Immutable view of the active student.
    pub fn student(&self) -> Option<&StudentState<B>> {
        self.student.as_ref()
    }

    /// Promote the trained student to teacher.
    ///
    /// The student model value moves into the teacher slot (converted to the
    /// inner backend, which freezes it); the previous teacher is dropped
    /// here and never aliased afterwards. When `next` carries a new student
    /// and stage, the loop continues; with `None` the context enters its
    /// terminal state.
    pub fn promote(&mut self, next: Option<(StudentState<B>, StageDescriptor)>) -> Result<()> {
        let outgoing = self
            .student
            .take()
            .ok_or_else(|| SslError::Training("promotion without an active student".to_string()))?;

        self.teacher = outgoing.model.valid();
        self.promotions += 1;

        if let Some((student, stage)) = next {
            self.student = Some(student);
            self.stage = stage;
            self.students_created += 1;
        }
        Ok(())
    }

    /// Whether the final promotion has happened
    pub fn is_done(&self) -> bool {
        self.student.is_none()
    }

    /// How many role swaps have occurred
    pub fn promotions(&self) -> usize {
        self.promotions
    }

    /// How many student models were instantiated over the run
    pub fn students_created(&self) -> usize {
        self.students_created
    }
}
