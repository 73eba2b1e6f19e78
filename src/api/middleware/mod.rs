//! HTTP middleware stack.
//!
//! Execution order (outermost → innermost):
//! 1. Access log: sees every response, including rejections
//! 2. Rate limiter: reject early, save upstream capacity

pub mod access_log;
pub mod rate;
