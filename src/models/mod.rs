pub mod config;
pub mod course;
pub mod selection;
pub mod user;

pub use config::{ConfigStatus, NewSelectionConfig, SelectionConfig};
pub use course::{Course, CourseStatus, NewCourse};
pub use selection::{
    FavoriteCourse, SelectionDetail, SelectionHistoryEntry, SelectionRecord, SelectionStatus,
};
pub use user::{NewUser, User};
