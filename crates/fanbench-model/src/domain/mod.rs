mod run_request;
pub use run_request::RunRequest;

mod run_state;
pub use run_state::RunState;
