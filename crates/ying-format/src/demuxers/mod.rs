//! 解封装器实现模块.

pub mod bink;
