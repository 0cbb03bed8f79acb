//! assessd: in-process session registry with sliding expiration and a
//! fixed-window rate limiter, served over HTTP for the maturity assessment.

pub mod cli;
pub mod config;
pub mod gateway;
pub mod http;
pub mod rate_limit;
pub mod session;
pub mod sweeper;
pub mod utils;
