pub mod errors;
pub mod guard;
pub mod session;
pub mod track;
pub mod up;
