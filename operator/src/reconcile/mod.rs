pub mod child_event;
pub mod controller;
pub mod create_delete;
pub mod discovery;
pub mod field_handlers;
pub mod parent_event;
pub mod patch;
pub mod statefulset_event;
