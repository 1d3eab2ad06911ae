// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Building blocks shared by the RPC bridge crates:
//! - [`value::Val`], the raw value model produced by action execution
//! - [`formatter`], the bidirectional field-name conversion between client and internal conventions
//! - [`logging_tracing`], the tracing subscriber setup

pub mod formatter;
pub mod logging_tracing;
pub mod value;
