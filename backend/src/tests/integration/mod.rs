//! Tests that exercise the SQL paths end to end against a disposable
//! Postgres. Everything here goes through TestContext from the parent
//! module.

mod health;
mod signing_flow;
mod sweep;
