//! `ribbit` is a CoAP client engine.
//!
//! It owns the parts of the protocol that are not about what a single
//! message looks like (that's [`ribbit_msg`]), but about conversations:
//!
//! - matching ACKs, RSTs and responses to the requests that caused them
//! - retransmitting confirmable requests with exponential backoff
//! - dropping duplicates
//! - splitting large request bodies into Block1 uploads, and reassembling Block2 responses
//! - ordering notifications of observed resources (RFC 7641)
//! - discovering resources through `/.well-known/core` (RFC 6690)
//!
//! The engine lives in [`core::Endpoint`]. It is generic over a [`time::Clock`] and
//! a [`net::Socket`], and does no I/O or waiting of its own; whoever owns it
//! calls [`Endpoint::poll`](core::Endpoint::poll) (from any number of threads),
//! and every request yields an [`exchange::Exchange`] that can be waited on
//! or given callbacks.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use ribbit::req::Req;
//! use ribbit::time::Timeout;
//!
//! let endpoint = Arc::new(ribbit::std::Endpoint::bind("0.0.0.0:0", Default::default()).unwrap());
//! let _driver = ribbit::std::Driver::spawn(endpoint.clone()).unwrap();
//!
//! let req = Req::get("127.0.0.1:5683".parse().unwrap(), "hello");
//! let exchange = endpoint.send(req).unwrap();
//!
//! match exchange.wait(Timeout::Millis(10_000)) {
//!   | Some(resp) => println!("{}: {:?}", resp.code(), resp.payload_str()),
//!   | None => println!("no response ({:?})", exchange.failure()),
//! }
//! ```

#![cfg_attr(not(test), warn(missing_debug_implementations, unreachable_pub))]
#![cfg_attr(not(test), deny(unsafe_code))]
#![cfg_attr(any(docsrs, feature = "docs"), feature(doc_cfg))]
#![warn(missing_docs)]

/// Block-wise transfers (RFC 7959)
pub mod block;

/// Runtime configuration
pub mod config;

/// The CoAP endpoint state machine
pub mod core;

/// Handles to in-flight requests
pub mod exchange;

/// Resource discovery and the CoRE link format (RFC 6690)
pub mod link_format;

/// Callback collections
pub mod listeners;

/// Network abstractions
pub mod net;

/// Observing resources (RFC 7641)
pub mod observe;

/// Requests
pub mod req;

/// Responses
pub mod resp;

/// Configurable retry strategies
pub mod retry;

/// `std` clock, socket & background driver
pub mod std;

/// Time abstractions
pub mod time;

#[doc(hidden)]
pub mod test;

pub(crate) mod logging;

#[doc(inline)]
pub use ribbit_msg::{Code, ContentFormat, Id, Message, MessageOptions, SpecVersion, Token, Type};

macro_rules! code {
  (rfc7252($section:literal) $name:ident = $c:literal * $d:literal) => {
    #[doc = toad_macros::rfc_7252_doc!($section)]
    #[allow(clippy::zero_prefixed_literal)]
    pub const $name: ribbit_msg::Code = ribbit_msg::Code::new($c, $d);
  };
  (rfc7252($section:literal) $name:ident = $newtype:tt($c:literal * $d:literal)) => {
    #[doc = toad_macros::rfc_7252_doc!($section)]
    #[allow(clippy::zero_prefixed_literal)]
    pub const $name: $newtype = $newtype(ribbit_msg::Code::new($c, $d));
  };
  (#[doc = $doc:expr] $name:ident = $c:literal * $d:literal) => {
    #[doc = $doc]
    #[allow(clippy::zero_prefixed_literal)]
    pub const $name: ribbit_msg::Code = ribbit_msg::Code::new($c, $d);
  };
}

pub(crate) use code;
