//! Request construction and response handling primitives.
//!
//! Every operation follows the same path: a [`Connector`] opens an
//! authenticated [`Connection`], the caller optionally attaches a body (JSON,
//! text or a [`multipart`] upload), the connection is sent, and [`dispatch`]
//! turns the response into a [`ResultEnvelope`].

mod connection;
pub mod constants;
pub mod multipart;
mod response;
mod xml;

pub use connection::{Connection, Connector};
pub use constants::{MediaTypes, ReturnFormat};
pub use multipart::{UploadTarget, write_multipart};
pub use response::{AttachmentStream, Body, ResultEnvelope, dispatch};
pub(crate) use response::status_text;
pub use xml::{XmlAttribute, XmlElement, XmlNode};
