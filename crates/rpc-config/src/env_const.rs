// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

pub const RPC_INPUT_FIELD_FORMATTER: &str = "RPC_INPUT_FIELD_FORMATTER";
pub const RPC_OUTPUT_FIELD_FORMATTER: &str = "RPC_OUTPUT_FIELD_FORMATTER";
pub const RPC_REQUIRE_TENANT_PARAMETERS: &str = "RPC_REQUIRE_TENANT_PARAMETERS";

pub const DEFAULT_FIELD_FORMATTER: &str = "camel_case";
