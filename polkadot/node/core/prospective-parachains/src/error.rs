// Copyright (C) Parity Technologies (UK) Ltd.
// This file is part of Polkadot.

// Polkadot is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// Polkadot is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.

// You should have received a copy of the GNU General Public License
// along with Polkadot.  If not, see <http://www.gnu.org/licenses/>.

//! Error types for the subsystem loop.

use crate::LOG_TARGET;
use fatality::Nested;

/// Errors which can occur while running the subsystem.
#[allow(missing_docs)]
#[fatality::fatality(splitable)]
pub enum Error {
	/// The channel delivering messages and signals was closed without a `Conclude`.
	#[fatal]
	#[error("Receiving message from overseer failed: channel closed")]
	SubsystemReceive,

	/// The requester went away before the response was sent.
	#[error("Response channel for `{0}` was dropped")]
	ResponseChannelDropped(&'static str),
}

/// General `Result` type.
pub type Result<T> = std::result::Result<T, Error>;
/// Result for fatal only failures.
pub type FatalResult<T> = std::result::Result<T, FatalError>;

/// Utility for eating top level errors and log them.
///
/// We basically always want to try and continue on error, unless the error is fatal for the entire
/// subsystem.
pub fn log_error(result: Result<()>) -> FatalResult<()> {
	match result.into_nested()? {
		Ok(()) => Ok(()),
		Err(jfyi) => {
			jfyi.log();
			Ok(())
		},
	}
}

impl JfyiError {
	/// Log a `JfyiError`.
	pub fn log(self) {
		tracing::debug!(target: LOG_TARGET, error = ?self);
	}
}
