// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! Unit tests live alongside their modules as `#[cfg(test)]` blocks in
//! `src/`. This entry point exists only to give the unit test binary a
//! stable name in `Cargo.toml`.
