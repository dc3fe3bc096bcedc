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

//! Asynchronous backing primitives.

use super::*;

/// A candidate included on the relay chain which is still pending availability.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
pub struct CandidatePendingAvailability {
	/// The hash of the candidate.
	pub candidate_hash: CandidateHash,
	/// The candidate's descriptor.
	pub descriptor: CandidateDescriptor,
	/// The commitments of the candidate.
	pub commitments: CandidateCommitments,
	/// The candidate's relay parent's number.
	pub relay_parent_number: BlockNumber,
	/// The candidate's relay parent's storage root.
	pub relay_parent_storage_root: Hash,
	/// The maximum Proof-of-Validity size allowed, in bytes.
	pub max_pov_size: u32,
}

impl CandidatePendingAvailability {
	/// Reassemble the committed receipt of the candidate.
	pub fn to_committed_receipt(&self) -> CommittedCandidateReceipt {
		CommittedCandidateReceipt {
			descriptor: self.descriptor.clone(),
			commitments: self.commitments.clone(),
		}
	}

	/// The persisted validation data the candidate was built against, given the head-data it
	/// builds upon.
	pub fn persisted_validation_data(&self, parent_head: HeadData) -> PersistedValidationData {
		PersistedValidationData {
			parent_head,
			relay_parent_number: self.relay_parent_number,
			relay_parent_storage_root: self.relay_parent_storage_root,
			max_pov_size: self.max_pov_size,
		}
	}
}
