//! `jobhost-protocol`: the single-line console protocol spoken by packaged jobs.
//!
//! A job writes ordinary text to stdout, or a structured line made of the
//! [`SENTINEL`] followed by a one-line JSON envelope:
//!
//! ```text
//! ##jobhost:{"type":"log","message":"imported 42 rows"}
//! ##jobhost:{"type":"email","subject":"Report","body":"...","to":"ops@example.com","attachments":[]}
//! ```
//!
//! [`decode`] never fails: anything that is not a well-formed envelope is
//! plain text and comes back as `None`.

pub mod codec;
pub mod envelope;

pub use codec::{decode, encode, ConsoleMessage, EmailAttachment, EmailRequest, SENTINEL};
