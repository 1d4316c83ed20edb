//! External collaborators
//!
//! The score engine does not own tasks, identities or file storage. It
//! consumes them through these traits; the bundled implementations read the
//! collaborator tables in the shared SQLite database, take identity from a
//! request header, and keep attachments on the local filesystem.

pub mod access;
pub mod attachments;
pub mod tasks;

pub use access::{AccessControl, HeaderAccessControl, USER_ID_HEADER};
pub use attachments::{AttachmentStorage, AttachmentUpload, FsAttachmentStorage, StoredFile};
pub use tasks::{SqliteTaskProvider, Stage, Task, TaskProvider};
