/// Session lifecycle: insertion-lock coordination, time banking, activation.
mod manager;

pub use manager::SessionManager;
