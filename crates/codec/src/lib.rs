//! Peer descriptors for the descriptor-based addressing scheme.
//!
//! A [`PeerDescriptor`] is serialized with `postcard` and then wrapped in
//! standard padded base64 so it can travel as a pub/sub payload:
//!
//! - [`encode`] - descriptor to payload string
//! - [`decode`] - payload string back to a descriptor, rejecting anything
//!   that [`encode`] could not have produced

#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]

mod descriptor;
mod encoding;
mod error;

pub use descriptor::PeerDescriptor;
pub use encoding::{decode, encode};
pub use error::{DecodeError, EncodeError};
