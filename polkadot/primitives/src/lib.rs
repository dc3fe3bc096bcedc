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

//! Primitives shared by the node-side code which tracks prospective parachain candidates.
//!
//! These are the candidate receipts, their commitments and the validation data they were built
//! against, together with the [`Hasher`] capability used to derive their identities.

#![warn(missing_docs)]

use codec::{Decode, Encode};
use std::fmt;

pub mod async_backing;

pub use primitive_types::H256;

/// The block number type of the relay chain.
pub type BlockNumber = u32;

/// The hash type of the relay chain. Also used for head-data and candidate identities.
pub type Hash = H256;

/// A capability producing 32-byte digests of arbitrary bytes.
///
/// Must be deterministic and collision-resistant. Everything that compares head-data or
/// candidates by hash must use the same hasher.
pub trait Hasher: Send + Sync {
	/// Hash the given bytes.
	fn hash(&self, data: &[u8]) -> Hash;
}

/// The default [`Hasher`]: Blake2b with a 256-bit output.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BlakeTwo256;

impl Hasher for BlakeTwo256 {
	fn hash(&self, data: &[u8]) -> Hash {
		H256(sp_crypto_hashing::blake2_256(data))
	}
}

/// Unique identifier of a parachain.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode)]
pub struct Id(u32);

impl From<u32> for Id {
	fn from(x: u32) -> Self {
		Id(x)
	}
}

impl From<Id> for u32 {
	fn from(x: Id) -> Self {
		x.0
	}
}

impl fmt::Debug for Id {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

impl fmt::Display for Id {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{}", self.0)
	}
}

/// The hash of a committed candidate receipt. This is the stable identity of a candidate.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode)]
pub struct CandidateHash(pub Hash);

impl fmt::Display for CandidateHash {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		fmt::Display::fmt(&self.0, f)
	}
}

impl fmt::Debug for CandidateHash {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "{:?}", self.0)
	}
}

/// Parachain head data. Opaque to the relay chain.
#[derive(Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Encode, Decode)]
pub struct HeadData(pub Vec<u8>);

impl HeadData {
	/// Returns the hash of the raw head-data bytes.
	pub fn hash(&self, hasher: &dyn Hasher) -> Hash {
		hasher.hash(&self.0)
	}
}

impl From<Vec<u8>> for HeadData {
	fn from(v: Vec<u8>) -> Self {
		HeadData(v)
	}
}

impl fmt::Debug for HeadData {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "HeadData(0x")?;
		for byte in &self.0 {
			write!(f, "{:02x}", byte)?;
		}
		write!(f, ")")
	}
}

/// Parachain validation code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct ValidationCode(pub Vec<u8>);

impl ValidationCode {
	/// The hash of the code blob.
	pub fn hash(&self, hasher: &dyn Hasher) -> ValidationCodeHash {
		ValidationCodeHash(hasher.hash(&self.0))
	}
}

impl From<Vec<u8>> for ValidationCode {
	fn from(v: Vec<u8>) -> Self {
		ValidationCode(v)
	}
}

/// The hash of [`ValidationCode`].
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Encode, Decode)]
pub struct ValidationCodeHash(Hash);

impl From<Hash> for ValidationCodeHash {
	fn from(hash: Hash) -> Self {
		ValidationCodeHash(hash)
	}
}

impl fmt::Debug for ValidationCodeHash {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		write!(f, "ValidationCodeHash({:?})", self.0)
	}
}

/// Identity of the collator which produced a candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct CollatorId(pub [u8; 32]);

/// Signature of a collator over the candidate descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct CollatorSignature(pub Vec<u8>);

/// A possible restriction that prevents a parachain from performing an upgrade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub enum UpgradeRestriction {
	/// There is an upgrade restriction and there are no details about its specifics nor how long
	/// it could last.
	Present,
}

/// A message sent from a parachain to the relay chain.
pub type UpwardMessage = Vec<u8>;

/// An HRMP message sent from a parachain to another parachain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct OutboundHrmpMessage {
	/// The para that will get this message in its downward message queue.
	pub recipient: Id,
	/// The message payload.
	pub data: Vec<u8>,
}

/// Commitments made in a candidate receipt: the effects of executing the candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct CandidateCommitments {
	/// Messages destined to be interpreted by the relay chain itself.
	pub upward_messages: Vec<UpwardMessage>,
	/// Horizontal messages sent by the parachain.
	pub horizontal_messages: Vec<OutboundHrmpMessage>,
	/// New validation code.
	pub new_validation_code: Option<ValidationCode>,
	/// The head-data produced as a result of execution.
	pub head_data: HeadData,
	/// The number of messages processed from the DMQ.
	pub processed_downward_messages: u32,
	/// The mark which specifies the block number up to which all inbound HRMP messages are
	/// processed.
	pub hrmp_watermark: BlockNumber,
}

/// A unique descriptor of the candidate receipt.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct CandidateDescriptor {
	/// The ID of the para this is a candidate for.
	pub para_id: Id,
	/// The hash of the relay-chain block this is executed in the context of.
	pub relay_parent: Hash,
	/// The collator's public key.
	pub collator: CollatorId,
	/// The blake2-256 hash of the persisted validation data. This is extra data derived from
	/// relay-chain state which may vary based on bitfields included before the candidate.
	pub persisted_validation_data_hash: Hash,
	/// The blake2-256 hash of the PoV.
	pub pov_hash: Hash,
	/// The root of a block's erasure encoding Merkle tree.
	pub erasure_root: Hash,
	/// Signature on the descriptor fields by the collator.
	pub signature: CollatorSignature,
	/// Hash of the para header that is being generated by this candidate.
	pub para_head: Hash,
	/// The blake2-256 hash of the validation code bytes.
	pub validation_code_hash: ValidationCodeHash,
}

/// A candidate receipt with its commitments in full.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct CommittedCandidateReceipt {
	/// The descriptor of the candidate.
	pub descriptor: CandidateDescriptor,
	/// The commitments of the candidate receipt.
	pub commitments: CandidateCommitments,
}

impl CommittedCandidateReceipt {
	/// Get a reference to the candidate descriptor.
	pub fn descriptor(&self) -> &CandidateDescriptor {
		&self.descriptor
	}

	/// Computes the hash of the committed candidate receipt.
	pub fn hash(&self, hasher: &dyn Hasher) -> CandidateHash {
		CandidateHash(hasher.hash(&self.encode()))
	}
}

/// The validation data which is persisted for every candidate and which its execution depends
/// on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Encode, Decode)]
pub struct PersistedValidationData {
	/// The parent head-data.
	pub parent_head: HeadData,
	/// The relay-chain block number this is in the context of.
	pub relay_parent_number: BlockNumber,
	/// The relay-chain block storage root this is in the context of.
	pub relay_parent_storage_root: Hash,
	/// The maximum legal size of a POV block, in bytes.
	pub max_pov_size: u32,
}

impl PersistedValidationData {
	/// Compute the hash of the encoded persisted validation data.
	pub fn hash(&self, hasher: &dyn Hasher) -> Hash {
		hasher.hash(&self.encode())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn head_data_hash_is_content_hash() {
		let a = HeadData(vec![1, 2, 3]);
		let b = HeadData(vec![1, 2, 3]);
		let c = HeadData(vec![1, 2, 4]);

		assert_eq!(a.hash(&BlakeTwo256), b.hash(&BlakeTwo256));
		assert_ne!(a.hash(&BlakeTwo256), c.hash(&BlakeTwo256));
		assert_eq!(a.hash(&BlakeTwo256), H256(sp_crypto_hashing::blake2_256(&[1, 2, 3])));
	}

	#[test]
	fn candidate_hash_covers_commitments() {
		let mut receipt = CommittedCandidateReceipt::default();
		let before = receipt.hash(&BlakeTwo256);

		receipt.commitments.head_data = vec![7].into();
		assert_ne!(receipt.hash(&BlakeTwo256), before);

		receipt.commitments.head_data = HeadData::default();
		assert_eq!(receipt.hash(&BlakeTwo256), before);
	}

	#[test]
	fn persisted_validation_data_hash_covers_every_field() {
		let pvd = PersistedValidationData {
			parent_head: vec![1].into(),
			relay_parent_number: 5,
			relay_parent_storage_root: Hash::repeat_byte(3),
			max_pov_size: 1024,
		};

		let mut other = pvd.clone();
		other.max_pov_size = 1025;

		assert_ne!(pvd.hash(&BlakeTwo256), other.hash(&BlakeTwo256));
	}

	#[test]
	fn debug_output_is_compact() {
		assert_eq!(format!("{:?}", Id::from(42)), "42");
		assert_eq!(format!("{:?}", HeadData(vec![0x0a, 0xff])), "HeadData(0x0aff)");
	}
}
