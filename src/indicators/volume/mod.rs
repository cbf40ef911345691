//! Volume indicators: Money Flow Index

pub mod mfi;
