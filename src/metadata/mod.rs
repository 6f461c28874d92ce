//! Value types describing the managed code base being observed.
//!
//! Everything in here is plain data: method identities, instruction streams and exception
//! regions. Nothing reaches into a live runtime; hosts translate their reflection handles into
//! these types at the adapter boundary.

pub mod method;
