// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The declarative shape of the resources exposed over RPC, and read-only lookups against it.
//!
//! A [`schema::Schema`] is built once at startup (from a [`schema::SchemaDefinition`], typically
//! deserialized from JSON) and shared immutably by every request afterwards.

pub mod introspector;
pub mod mapped_arena;
pub mod resource;
pub mod schema;
pub mod types;
