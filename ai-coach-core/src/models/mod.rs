pub mod consultation;
pub mod embedding;
pub mod entry;
pub mod event;
pub mod program;
pub mod recommendation;

pub use consultation::{
    ConsultationExtraction, ConsultationMessage, ConsultationMessageRole, ConsultationSession,
    ConsultationStatus, ExtractionCategory, SpecialistType,
};
pub use embedding::{Embedding, EmbeddingSourceType, PendingEmbeddingJob};
pub use entry::{
    ActivityEntry, EntrySource, EntryType, ExerciseSet, FoodItem, MealEntry, MeasurementEntry,
    NoteEntry, WorkoutEntry,
};
pub use event::{derive_periodization_phase, Event, EventFamily, EventStatus, EventType, PeriodizationPhase};
pub use program::{Program, ProgramDay, ProgramStatus};
pub use recommendation::{
    best_match_for_log, sort_recommendations, Recommendation, RecommendationStatus, RecommendationType,
};
