// Copyright 2025 Anapaya Systems
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//! Overlay subnet lease daemon.
//!
//! Acquires a subnet of the overlay network for this host through the
//! allocation backend, publishes it as a subnet environment file and keeps the
//! lease alive until shut down.

pub mod cli;
pub mod daemon;
pub mod subnet_env;
