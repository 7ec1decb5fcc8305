//! Resource wrappers over the `ApiClient` shorthands.

mod projects;
mod tasks;
mod teams;

pub use projects::ProjectsApi;
pub use tasks::TasksApi;
pub use teams::TeamsApi;
