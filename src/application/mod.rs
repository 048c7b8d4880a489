pub mod attendance_editor;
pub mod block_editor;
pub mod bootstrap;
pub mod commands;
pub mod commit;
