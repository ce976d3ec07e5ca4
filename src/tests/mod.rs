//! End-to-end solving scenarios and semantic property checks.

mod ncsp;
mod projections;
