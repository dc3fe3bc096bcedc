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

//! Messages understood by the prospective parachains subsystem, and the signals driving it.

use std::sync::Arc;

use futures::channel::oneshot;
use prospective_primitives::{
	async_backing::CandidatePendingAvailability, BlockNumber, CandidateHash,
	CommittedCandidateReceipt, Hash, HeadData, Hasher, Id as ParaId, PersistedValidationData,
};
use prospective_subsystem_util::inclusion_emulator::{Constraints, RelayChainBlockInfo};

/// Indicates the relay-parents whose fragment tree a candidate
/// is present in and the depths of that tree the candidate is present in.
pub type FragmentTreeMembership = Vec<(Hash, Vec<usize>)>;

/// A message or a signal delivered to the subsystem.
#[derive(Debug)]
pub enum FromOrchestra<M> {
	/// Signal about the state of the relay chain.
	Signal(OverseerSignal),
	/// A message to handle.
	Communication {
		/// The message.
		msg: M,
	},
}

impl<M> From<OverseerSignal> for FromOrchestra<M> {
	fn from(signal: OverseerSignal) -> Self {
		FromOrchestra::Signal(signal)
	}
}

/// Signals driving the subsystem.
#[derive(Debug)]
pub enum OverseerSignal {
	/// Relay-chain leaves were activated or deactivated.
	ActiveLeaves(ActiveLeavesUpdate),
	/// The subsystem should stop.
	Conclude,
}

/// Changes in the set of active relay-chain leaves.
#[derive(Debug, Default)]
pub struct ActiveLeavesUpdate {
	/// The newly activated leaf, if any.
	pub activated: Option<ActivatedLeaf>,
	/// Leaves which are no longer active.
	pub deactivated: Vec<Hash>,
}

impl ActiveLeavesUpdate {
	/// An update activating a single leaf.
	pub fn start_work(activated: ActivatedLeaf) -> Self {
		Self { activated: Some(activated), ..Default::default() }
	}

	/// An update deactivating a single leaf.
	pub fn stop_work(hash: Hash) -> Self {
		Self { deactivated: vec![hash], ..Default::default() }
	}
}

/// A newly activated relay-chain leaf together with everything needed to build the fragment
/// trees of the paras scheduled at it.
#[derive(Debug, Clone)]
pub struct ActivatedLeaf {
	/// The leaf itself.
	pub block_info: RelayChainBlockInfo,
	/// Ancestors of the leaf in descending order, starting with its parent. Only blocks of the
	/// same session as the leaf should be given.
	pub ancestry: Vec<RelayChainBlockInfo>,
	/// Paras scheduled at the leaf and their backing state.
	pub paras: Vec<(ParaId, BackingState)>,
}

/// The state of a para, as the relay chain sees it at some block.
#[derive(Debug, Clone)]
pub struct BackingState {
	/// The base constraints for candidates of the para.
	pub constraints: Constraints,
	/// Candidates included on chain but still pending availability, oldest first.
	pub pending_availability: Vec<CandidatePendingAvailability>,
}

/// A hypothetical candidate to be evaluated for frontier membership
/// in the prospective parachains subsystem.
///
/// Hypothetical candidates are either complete or incomplete.
/// Complete candidates have already had their (potentially heavy)
/// candidate receipt fetched, while incomplete candidates are simply
/// claims about properties that a fetched candidate would have.
///
/// Complete candidates can be evaluated more strictly than incomplete candidates.
#[derive(Debug, Clone, PartialEq)]
pub enum HypotheticalCandidate {
	/// A complete candidate.
	Complete {
		/// The hash of the candidate.
		candidate_hash: CandidateHash,
		/// The receipt of the candidate.
		receipt: Arc<CommittedCandidateReceipt>,
		/// The persisted validation data of the candidate.
		persisted_validation_data: PersistedValidationData,
	},
	/// An incomplete candidate.
	Incomplete {
		/// The claimed hash of the candidate.
		candidate_hash: CandidateHash,
		/// The claimed para-ID of the candidate.
		candidate_para: ParaId,
		/// The claimed head-data hash of the candidate.
		parent_head_data_hash: Hash,
		/// The claimed relay parent of the candidate.
		candidate_relay_parent: Hash,
	},
}

impl HypotheticalCandidate {
	/// Get the `CandidateHash` of the hypothetical candidate.
	pub fn candidate_hash(&self) -> CandidateHash {
		match *self {
			HypotheticalCandidate::Complete { candidate_hash, .. } => candidate_hash,
			HypotheticalCandidate::Incomplete { candidate_hash, .. } => candidate_hash,
		}
	}

	/// Get the `ParaId` of the hypothetical candidate.
	pub fn candidate_para(&self) -> ParaId {
		match *self {
			HypotheticalCandidate::Complete { ref receipt, .. } => receipt.descriptor().para_id,
			HypotheticalCandidate::Incomplete { candidate_para, .. } => candidate_para,
		}
	}

	/// Get the hash of the head-data the candidate builds upon.
	pub fn parent_head_data_hash(&self, hasher: &dyn Hasher) -> Hash {
		match *self {
			HypotheticalCandidate::Complete { ref persisted_validation_data, .. } =>
				persisted_validation_data.parent_head.hash(hasher),
			HypotheticalCandidate::Incomplete { parent_head_data_hash, .. } =>
				parent_head_data_hash,
		}
	}

	/// Get the relay-parent of the candidate.
	pub fn relay_parent(&self) -> Hash {
		match *self {
			HypotheticalCandidate::Complete { ref receipt, .. } =>
				receipt.descriptor().relay_parent,
			HypotheticalCandidate::Incomplete { candidate_relay_parent, .. } =>
				candidate_relay_parent,
		}
	}
}

/// Request specifying which candidates are either already included
/// or might be included in the hypothetical frontier of fragment trees
/// under a given active leaf.
#[derive(Debug, PartialEq, Clone)]
pub struct HypotheticalFrontierRequest {
	/// Candidates, in arbitrary order, which should be checked for
	/// possible membership in fragment trees.
	pub candidates: Vec<HypotheticalCandidate>,
	/// Either a specific fragment tree to check, otherwise all.
	pub fragment_tree_relay_parent: Option<Hash>,
	/// Only return membership if all candidates in the path from the
	/// root are backed.
	pub backed_in_path_only: bool,
}

/// A request for the persisted validation data stored in the prospective
/// parachains subsystem.
#[derive(Debug, Clone)]
pub struct ProspectiveValidationDataRequest {
	/// The para-id of the candidate.
	pub para_id: ParaId,
	/// The relay-parent of the candidate.
	pub candidate_relay_parent: Hash,
	/// The parent head-data.
	pub parent_head_data: ParentHeadData,
}

/// The parent head-data hash with optional data itself.
#[derive(PartialEq, Eq, Debug, Clone)]
pub enum ParentHeadData {
	/// Parent head-data hash.
	OnlyHash(Hash),
	/// Parent head-data along with its hash.
	WithData {
		/// This will be provided for collations with elastic scaling enabled.
		head_data: HeadData,
		/// Parent head-data hash.
		hash: Hash,
	},
}

impl ParentHeadData {
	/// Return the hash of the parent head-data.
	pub fn hash(&self) -> Hash {
		match self {
			ParentHeadData::OnlyHash(hash) => *hash,
			ParentHeadData::WithData { hash, .. } => *hash,
		}
	}
}

/// A request to introduce a new candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct IntroduceCandidateRequest {
	/// The para-id of the candidate.
	pub candidate_para: ParaId,
	/// The candidate receipt itself.
	pub candidate_receipt: CommittedCandidateReceipt,
	/// The persisted validation data of the candidate.
	pub persisted_validation_data: PersistedValidationData,
}

/// Messages sent to the Prospective Parachains subsystem.
#[derive(Debug)]
pub enum ProspectiveParachainsMessage {
	/// Inform the Prospective Parachains Subsystem of a new candidate.
	///
	/// The response sender accepts the candidate membership, which is the existing
	/// membership of the candidate if it was already known.
	IntroduceCandidate(IntroduceCandidateRequest, oneshot::Sender<FragmentTreeMembership>),
	/// Inform the Prospective Parachains Subsystem that a previously introduced candidate
	/// has been seconded. This requires that the candidate was successfully introduced in
	/// the past.
	CandidateSeconded(ParaId, CandidateHash),
	/// Inform the Prospective Parachains Subsystem that a previously introduced candidate
	/// has been backed. This requires that the candidate was successfully introduced in
	/// the past.
	CandidateBacked(ParaId, CandidateHash),
	/// Get a backable candidate hash along with its relay parent for the given parachain,
	/// under the given relay-parent hash, which is a descendant of the given candidate hashes.
	/// Returns `None` on the channel if no such candidate exists.
	GetBackableCandidate(
		Hash,
		ParaId,
		Vec<CandidateHash>,
		oneshot::Sender<Option<(CandidateHash, Hash)>>,
	),
	/// Get the hypothetical frontier membership of candidates with the given properties
	/// under the specified active leaves' fragment trees.
	///
	/// For any candidate which is already known, this returns the depths the candidate
	/// occupies.
	GetHypotheticalFrontier(
		HypotheticalFrontierRequest,
		oneshot::Sender<Vec<(HypotheticalCandidate, FragmentTreeMembership)>>,
	),
	/// Get the membership of the candidate in all fragment trees.
	GetTreeMembership(ParaId, CandidateHash, oneshot::Sender<FragmentTreeMembership>),
	/// Get the minimum accepted relay-parent number for each para in the fragment tree
	/// for the given relay-chain block hash.
	///
	/// That is, if the block hash is known and is an active leaf, this returns the
	/// minimum relay-parent block number in the same branch of the relay chain which
	/// is accepted in the fragment tree for each para-id.
	///
	/// If the block hash is not an active leaf, this will return an empty vector.
	///
	/// Para-IDs which are omitted from this list can be assumed to have no
	/// valid candidate relay-parents under the given relay-chain block hash.
	GetMinimumRelayParents(Hash, oneshot::Sender<Vec<(ParaId, BlockNumber)>>),
	/// Get the validation data of some prospective candidate. The candidate doesn't need
	/// to be part of any fragment tree, but this only succeeds if the parent head-data and
	/// relay-parent are part of some fragment tree.
	GetProspectiveValidationData(
		ProspectiveValidationDataRequest,
		oneshot::Sender<Option<PersistedValidationData>>,
	),
}
