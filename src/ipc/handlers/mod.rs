pub mod attendance;
pub mod core;
pub mod dashboard;
pub mod session;
pub mod setup;
pub mod timetable;
