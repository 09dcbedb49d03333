//! Data models for backend resources.
//!
//! - `Project`: a project owned by the signed-in user
//! - `Epic`, `EpicPerson`: epics tracked within a project
//! - `Member`: a project member
//! - `User`: the authenticated account

pub mod epic;
pub mod member;
pub mod project;
pub mod user;

pub use epic::{Epic, EpicPerson, EpicUpdate, NewEpic};
pub use member::{Member, MemberMetadata};
pub use project::{NewProject, Project, ProjectUpdate};
pub use user::{User, UserMetadata};
