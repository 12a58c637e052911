//! Analysis plugins that run over a driver session.

pub mod memsearch;
