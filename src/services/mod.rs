pub mod gemini;
pub mod session_manager;
pub mod upstream;
