//! Sub-protocols shared by the preprocessing dealers.

pub(crate) mod cointossing;
