pub mod spot_store;

pub use spot_store::{
    AssignmentDetails, CategorySummary, ProcessingStatus, ReviewSummary, SpotStore, YearSummary,
};
