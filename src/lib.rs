//! On-device store for waste-management learning content.
//!
//! Articles and quizzes live in a single SQLite file. The store migrates its
//! own schema, seeds default content on first use and exposes CRUD through
//! [`storage::ContentStore`].

pub mod config;
pub mod storage;
