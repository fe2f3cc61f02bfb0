/*
 * This file is part of pcihook.
 *
 * Copyright (C) 2025 pcihook contributors
 *
 * pcihook is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * pcihook is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with pcihook. If not, see <https://www.gnu.org/licenses/>.
 */

//! pcihook binary internals
//!
//! Exposed as a library so integration tests can drive the CLI parser and
//! the dispatch path.

pub mod cli;
pub mod dispatch;
pub mod logging;
