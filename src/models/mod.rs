mod forms;
mod problems;
mod user;
mod worksheet;

pub use forms::{GenerateForm, LoginForm, RegisterRequest};
pub use problems::{Problem, ProblemSet};
pub use user::{CurrentUser, PublicUser, User};
pub use worksheet::{Worksheet, WorksheetRequest, WorksheetStatus};
