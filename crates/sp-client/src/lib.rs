//! Signed HTTP client for Greenfield storage providers (SPs).
//!
//! # Layers
//!
//! 1. [`signer`] canonicalizes a request and attaches an
//!    `ECDSA-secp256k1` authorization header.
//! 2. [`Client::send`] assembles admin or data URLs, sets the Greenfield
//!    headers, executes and turns non-2xx answers into [`ErrResponse`].
//! 3. [`Client::get_approval`] and the object operations
//!    ([`Client::put_object`], [`Client::get_object`],
//!    [`Client::fget_object`], [`Client::list_objects`]) sit on top.
//!
//! Every public call takes a [`CancellationToken`](tokio_util::sync::CancellationToken);
//! cancellation wins over any transport error raced against it.

mod account;
mod approval;
mod client;
mod error;
mod object;
mod request;
mod retry;
pub mod signer;

#[cfg(test)]
mod test_util;

pub use account::{Account, HexKeyFile, KeyStore};
pub use client::{Client, ClientBuilder, ClientConfig};
pub use error::{ErrResponse, Error};
pub use object::{GetObjectOptions, ObjectBody, PutObjectOptions, UploadResult};
pub use request::{Body, ByteRange, RequestMeta, SendOptions};
pub use retry::RetryOptions;
pub use signer::AuthInfo;
