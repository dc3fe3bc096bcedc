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

//! Per-para storage of candidates which have been introduced to the subsystem.

use std::{
	collections::{
		hash_map::{Entry, HashMap},
		HashSet,
	},
	sync::Arc,
};

use crate::LOG_TARGET;
use prospective_primitives::{
	CandidateHash, CommittedCandidateReceipt, Hash, HeadData, Hasher, PersistedValidationData,
};
use prospective_subsystem_util::inclusion_emulator::{ProspectiveCandidate, RelayChainBlockInfo};

/// Kinds of failures to import a candidate into storage.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CandidateStorageInsertionError {
	/// An error indicating that a supplied candidate didn't match the persisted
	/// validation data provided alongside it.
	#[error("Persisted validation data does not match the candidate descriptor")]
	PersistedValidationDataMismatch,
	/// The candidate was already known.
	#[error("Candidate {0} is already known")]
	CandidateAlreadyKnown(CandidateHash),
}

/// Stores candidates and information about them such as their relay-parents and their backing
/// states.
///
/// There is a single storage per para, shared by reference between all the fragment trees of
/// that para.
pub struct CandidateStorage {
	hasher: Arc<dyn Hasher>,

	// Index from head data hash to candidate hashes with that head data as a parent.
	by_parent_head: HashMap<Hash, HashSet<CandidateHash>>,

	// Index from head data hash to candidate hashes outputting that head data.
	by_output_head: HashMap<Hash, HashSet<CandidateHash>>,

	// Index from candidate hash to the candidate entry.
	by_candidate_hash: HashMap<CandidateHash, CandidateEntry>,
}

impl CandidateStorage {
	/// Create a new, empty `CandidateStorage` hashing head-data with the given hasher.
	pub fn new(hasher: Arc<dyn Hasher>) -> Self {
		CandidateStorage {
			hasher,
			by_parent_head: HashMap::new(),
			by_output_head: HashMap::new(),
			by_candidate_hash: HashMap::new(),
		}
	}

	/// The hasher this storage indexes head-data with.
	pub fn hasher(&self) -> &Arc<dyn Hasher> {
		&self.hasher
	}

	/// Introduce a new candidate.
	///
	/// `candidate_hash` must be the hash of `candidate`; the caller has usually computed it
	/// already.
	pub fn add_candidate(
		&mut self,
		candidate_hash: CandidateHash,
		candidate: CommittedCandidateReceipt,
		persisted_validation_data: PersistedValidationData,
	) -> Result<(), CandidateStorageInsertionError> {
		if self.by_candidate_hash.contains_key(&candidate_hash) {
			return Err(CandidateStorageInsertionError::CandidateAlreadyKnown(candidate_hash))
		}

		if persisted_validation_data.hash(&*self.hasher) !=
			candidate.descriptor.persisted_validation_data_hash
		{
			return Err(CandidateStorageInsertionError::PersistedValidationDataMismatch)
		}

		let parent_head_hash = persisted_validation_data.parent_head.hash(&*self.hasher);
		let output_head_hash = candidate.commitments.head_data.hash(&*self.hasher);
		let CommittedCandidateReceipt { descriptor, commitments } = candidate;
		let entry = CandidateEntry {
			candidate_hash,
			relay_parent: descriptor.relay_parent,
			state: CandidateState::Introduced,
			candidate: Arc::new(ProspectiveCandidate {
				commitments,
				collator: descriptor.collator,
				collator_signature: descriptor.signature,
				persisted_validation_data,
				pov_hash: descriptor.pov_hash,
				validation_code_hash: descriptor.validation_code_hash,
			}),
		};

		self.by_parent_head.entry(parent_head_hash).or_default().insert(candidate_hash);
		self.by_output_head.entry(output_head_hash).or_default().insert(candidate_hash);
		self.by_candidate_hash.insert(candidate_hash, entry);

		Ok(())
	}

	/// Remove a candidate from the store.
	pub fn remove_candidate(&mut self, candidate_hash: &CandidateHash) {
		let Some(entry) = self.by_candidate_hash.remove(candidate_hash) else { return };

		let candidate = &entry.candidate;
		let parent_head_hash = candidate.persisted_validation_data.parent_head.hash(&*self.hasher);
		remove_from_index(&mut self.by_parent_head, parent_head_hash, candidate_hash);

		let output_head_hash = candidate.commitments.head_data.hash(&*self.hasher);
		remove_from_index(&mut self.by_output_head, output_head_hash, candidate_hash);
	}

	/// Note that an existing candidate has been seconded.
	pub fn mark_seconded(&mut self, candidate_hash: &CandidateHash) {
		if let Some(entry) = self.by_candidate_hash.get_mut(candidate_hash) {
			if entry.state != CandidateState::Backed {
				entry.state = CandidateState::Seconded;
			}
		}
	}

	/// Note that an existing candidate has been backed.
	pub fn mark_backed(&mut self, candidate_hash: &CandidateHash) {
		if let Some(entry) = self.by_candidate_hash.get_mut(candidate_hash) {
			tracing::trace!(target: LOG_TARGET, ?candidate_hash, "Candidate marked as backed");
			entry.state = CandidateState::Backed;
		} else {
			tracing::trace!(
				target: LOG_TARGET,
				?candidate_hash,
				"Candidate not found while marking as backed",
			);
		}
	}

	/// Whether a candidate is recorded as being backed.
	pub fn is_backed(&self, candidate_hash: &CandidateHash) -> bool {
		self.by_candidate_hash
			.get(candidate_hash)
			.map_or(false, |e| e.state == CandidateState::Backed)
	}

	/// Whether a candidate is contained within the storage already.
	pub fn contains(&self, candidate_hash: &CandidateHash) -> bool {
		self.by_candidate_hash.contains_key(candidate_hash)
	}

	/// Get a candidate entry by hash.
	pub fn get(&self, candidate_hash: &CandidateHash) -> Option<&CandidateEntry> {
		self.by_candidate_hash.get(candidate_hash)
	}

	/// Retain only candidates which pass the predicate.
	pub fn retain(&mut self, pred: impl Fn(&CandidateHash) -> bool) {
		self.by_candidate_hash.retain(|h, _v| pred(h));
		self.by_parent_head.retain(|_parent, children| {
			children.retain(|h| pred(h));
			!children.is_empty()
		});
		self.by_output_head.retain(|_output, candidates| {
			candidates.retain(|h| pred(h));
			!candidates.is_empty()
		});
	}

	/// Get head-data by hash.
	pub fn head_data_by_hash(&self, hash: &Hash) -> Option<&HeadData> {
		// Candidates outputting the head-data are preferred over those building upon it.
		self.by_output_head
			.get(hash)
			.and_then(|m| m.iter().next())
			.and_then(|a_candidate| self.by_candidate_hash.get(a_candidate))
			.map(|e| &e.candidate.commitments.head_data)
			.or_else(|| {
				self.by_parent_head
					.get(hash)
					.and_then(|m| m.iter().next())
					.and_then(|a_candidate| self.by_candidate_hash.get(a_candidate))
					.map(|e| &e.candidate.persisted_validation_data.parent_head)
			})
	}

	/// Returns candidate's relay parent, if present.
	pub fn relay_parent_by_candidate_hash(&self, candidate_hash: &CandidateHash) -> Option<Hash> {
		self.by_candidate_hash.get(candidate_hash).map(|entry| entry.relay_parent)
	}

	/// Iterate over all the candidates building upon the given parent head-data hash.
	pub fn iter_para_children<'a>(
		&'a self,
		parent_head_hash: &Hash,
	) -> impl Iterator<Item = &'a CandidateEntry> + 'a {
		let by_candidate_hash = &self.by_candidate_hash;
		self.by_parent_head
			.get(parent_head_hash)
			.into_iter()
			.flat_map(|hashes| hashes.iter())
			.filter_map(move |h| by_candidate_hash.get(h))
	}

	/// The number of candidates in the storage.
	pub fn len(&self) -> usize {
		self.by_candidate_hash.len()
	}

	/// Whether the storage holds no candidates.
	pub fn is_empty(&self) -> bool {
		self.by_candidate_hash.is_empty()
	}

	#[cfg(test)]
	pub(crate) fn index_lens(&self) -> (usize, usize, usize) {
		(self.by_parent_head.len(), self.by_output_head.len(), self.by_candidate_hash.len())
	}

	#[cfg(test)]
	pub(crate) fn indexed_by_heads(
		&self,
		candidate_hash: &CandidateHash,
		parent_head_hash: &Hash,
		output_head_hash: &Hash,
	) -> (bool, bool) {
		(
			self.by_parent_head
				.get(parent_head_hash)
				.map_or(false, |s| s.contains(candidate_hash)),
			self.by_output_head
				.get(output_head_hash)
				.map_or(false, |s| s.contains(candidate_hash)),
		)
	}
}

fn remove_from_index(
	index: &mut HashMap<Hash, HashSet<CandidateHash>>,
	head_hash: Hash,
	candidate_hash: &CandidateHash,
) {
	if let Entry::Occupied(mut e) = index.entry(head_hash) {
		e.get_mut().remove(candidate_hash);
		if e.get().is_empty() {
			e.remove();
		}
	}
}

/// The state of a candidate.
///
/// States only move forward: a backed candidate never becomes merely seconded again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateState {
	/// The candidate has been introduced in a spam-protected way but
	/// is not necessarily backed.
	Introduced,
	/// The candidate has been seconded.
	Seconded,
	/// The candidate has been completely backed by the group.
	Backed,
}

/// A candidate held by the [`CandidateStorage`].
#[derive(Debug)]
pub struct CandidateEntry {
	pub(crate) candidate_hash: CandidateHash,
	pub(crate) relay_parent: Hash,
	pub(crate) candidate: Arc<ProspectiveCandidate>,
	pub(crate) state: CandidateState,
}

impl CandidateEntry {
	/// The hash of the candidate.
	pub fn candidate_hash(&self) -> CandidateHash {
		self.candidate_hash
	}

	/// The relay-parent the candidate was built upon.
	pub fn relay_parent(&self) -> Hash {
		self.relay_parent
	}

	/// The current backing state of the candidate.
	pub fn state(&self) -> CandidateState {
		self.state
	}

	/// The candidate data.
	pub fn candidate(&self) -> &ProspectiveCandidate {
		&self.candidate
	}
}

/// A candidate existing on-chain but pending availability, for special treatment
/// in the [`Scope`](super::Scope).
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAvailability {
	/// The candidate hash.
	pub candidate_hash: CandidateHash,
	/// The block info of the relay parent.
	pub relay_parent: RelayChainBlockInfo,
}
