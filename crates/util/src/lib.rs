pub mod path_processing;
pub mod text_processing;

pub use path_processing::{WorkspacePathError, find_executable, resolve_workspace_relative};
pub use text_processing::{collapse_whitespace, redact_json, redact_sensitive, sanitize_identifier};
