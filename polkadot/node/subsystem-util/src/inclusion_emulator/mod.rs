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

//! The inclusion emulator.
//!
//! Node-side code uses this module to predict what the relay chain will accept for a parachain
//! before the relay chain gets to see the candidates. The predictions allow prospective chains of
//! candidates to be built ahead of the relay chain.
//!
//! There are two key data types: [`Constraints`] and [`Fragment`]s.
//!
//! [`Constraints`] exhaustively define the set of valid inputs and outputs to parachain execution
//! at some point in the relay chain: which head-data the next block must build on, how many
//! messages may still be sent, which validation code must be used and so on.
//!
//! A [`Fragment`] is a parachain candidate anchored to a particular relay-chain block, known as
//! the relay-parent, which has been checked against a set of operating constraints. Fragments
//! carry the [`ConstraintModifications`] the candidate would cause, so that a chain of fragments
//! can be checked by stacking modifications on top of some base constraints:
//!
//! ```text
//! base constraints --(mods of A)--> constraints for B --(mods of B)--> constraints for C
//! ```
//!
//! The relay chain accepts candidates based on whether they are valid under the constraints of
//! the present moment, not on whether they were valid at the time of construction. Fragments are
//! therefore a snapshot: a candidate which fails against some constraints may well pass against
//! others further along the relay chain.

use prospective_primitives::{
	BlockNumber, CandidateCommitments, CollatorId, CollatorSignature, Hash, HeadData,
	Id as ParaId, PersistedValidationData, UpgradeRestriction, ValidationCodeHash,
};
use std::{collections::HashMap, sync::Arc};

#[cfg(test)]
mod tests;

/// Constraints on inbound HRMP channels.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundHrmpLimitations {
	/// An exhaustive set of all valid watermarks, sorted ascending.
	pub valid_watermarks: Vec<BlockNumber>,
}

/// Constraints on outbound HRMP channels.
#[derive(Debug, Clone, PartialEq)]
pub struct OutboundHrmpChannelLimitations {
	/// The maximum bytes that can be written to the channel.
	pub bytes_remaining: usize,
	/// The maximum messages that can be written to the channel.
	pub messages_remaining: usize,
}

/// Constraints on the actions that can be taken by a new parachain block. These limitations are
/// implicitly associated with some particular parachain, which should be apparent from usage.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraints {
	/// The minimum relay-parent number accepted under these constraints.
	pub min_relay_parent_number: BlockNumber,
	/// The maximum Proof-of-Validity size allowed, in bytes.
	pub max_pov_size: u32,
	/// The maximum new validation code size allowed, in bytes.
	pub max_code_size: usize,
	/// The amount of UMP messages remaining.
	pub ump_remaining: usize,
	/// The amount of UMP bytes remaining.
	pub ump_remaining_bytes: usize,
	/// The maximum number of UMP messages allowed per candidate.
	pub max_ump_num_per_candidate: usize,
	/// Remaining DMP queue. Only includes sent-at block numbers.
	pub dmp_remaining_messages: Vec<BlockNumber>,
	/// The limitations of all registered inbound HRMP channels.
	pub hrmp_inbound: InboundHrmpLimitations,
	/// The limitations of all registered outbound HRMP channels.
	pub hrmp_channels_out: HashMap<ParaId, OutboundHrmpChannelLimitations>,
	/// The maximum number of HRMP messages allowed per candidate.
	pub max_hrmp_num_per_candidate: usize,
	/// The required parent head-data of the parachain.
	pub required_parent: HeadData,
	/// The expected validation-code-hash of this parachain.
	pub validation_code_hash: ValidationCodeHash,
	/// The code upgrade restriction signal as-of this parachain.
	pub upgrade_restriction: Option<UpgradeRestriction>,
	/// The future validation code hash, if any, and at what relay-parent
	/// number the upgrade would be minimally applied.
	pub future_validation_code: Option<(BlockNumber, ValidationCodeHash)>,
}

/// Kinds of errors that can occur when modifying constraints.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModificationError {
	/// The HRMP watermark is not allowed.
	#[error("HRMP watermark {0} is not allowed")]
	DisallowedHrmpWatermark(BlockNumber),
	/// No such HRMP outbound channel.
	#[error("No outbound HRMP channel to para {0}")]
	NoSuchHrmpChannel(ParaId),
	/// Too many messages submitted to HRMP channel.
	#[error(
		"Too many HRMP messages to para {para_id}: {messages_submitted} submitted, \
		{messages_remaining} remaining"
	)]
	HrmpMessagesOverflow {
		/// The ID of the recipient.
		para_id: ParaId,
		/// The amount of remaining messages in the capacity of the channel.
		messages_remaining: usize,
		/// The amount of messages submitted to the channel.
		messages_submitted: usize,
	},
	/// Too many bytes submitted to HRMP channel.
	#[error(
		"Too many HRMP bytes to para {para_id}: {bytes_submitted} submitted, \
		{bytes_remaining} remaining"
	)]
	HrmpBytesOverflow {
		/// The ID of the recipient.
		para_id: ParaId,
		/// The amount of remaining bytes in the capacity of the channel.
		bytes_remaining: usize,
		/// The amount of bytes submitted to the channel.
		bytes_submitted: usize,
	},
	/// Too many messages submitted to UMP.
	#[error("Too many UMP messages: {messages_submitted} sent, {messages_remaining} remaining")]
	UmpMessagesOverflow {
		/// The amount of remaining messages in the capacity of UMP.
		messages_remaining: usize,
		/// The amount of messages submitted to UMP.
		messages_submitted: usize,
	},
	/// Too many bytes submitted to UMP.
	#[error("Too many UMP bytes: {bytes_submitted} submitted, {bytes_remaining} remaining")]
	UmpBytesOverflow {
		/// The amount of remaining bytes in the capacity of UMP.
		bytes_remaining: usize,
		/// The amount of bytes submitted to UMP.
		bytes_submitted: usize,
	},
	/// Too many messages processed from DMP.
	#[error("Processed {messages_processed} DMP messages, only {messages_remaining} queued")]
	DmpMessagesUnderflow {
		/// The amount of messages waiting to be processed from DMP.
		messages_remaining: usize,
		/// The amount of messages processed.
		messages_processed: usize,
	},
	/// No validation code upgrade to apply.
	#[error("Applied a code upgrade which was not scheduled")]
	AppliedNonexistentCodeUpgrade,
}

impl Constraints {
	/// Check modifications against constraints.
	pub fn check_modifications(
		&self,
		modifications: &ConstraintModifications,
	) -> Result<(), ModificationError> {
		if let Some(HrmpWatermarkUpdate::Trunk(hrmp_watermark)) = modifications.hrmp_watermark {
			// Head updates are always valid.
			if !self.hrmp_inbound.valid_watermarks.contains(&hrmp_watermark) {
				return Err(ModificationError::DisallowedHrmpWatermark(hrmp_watermark))
			}
		}

		for (id, outbound_hrmp_mod) in &modifications.outbound_hrmp {
			let outbound = self
				.hrmp_channels_out
				.get(id)
				.ok_or(ModificationError::NoSuchHrmpChannel(*id))?;

			outbound_budget(outbound, *id, outbound_hrmp_mod)?;
		}

		ump_budget(self, modifications)?;

		if modifications.dmp_messages_processed > self.dmp_remaining_messages.len() {
			return Err(ModificationError::DmpMessagesUnderflow {
				messages_remaining: self.dmp_remaining_messages.len(),
				messages_processed: modifications.dmp_messages_processed,
			})
		}

		if self.future_validation_code.is_none() && modifications.code_upgrade_applied {
			return Err(ModificationError::AppliedNonexistentCodeUpgrade)
		}

		Ok(())
	}

	/// Apply modifications to these constraints. If this succeeds, it passes
	/// all sanity-checks.
	pub fn apply_modifications(
		&self,
		modifications: &ConstraintModifications,
	) -> Result<Self, ModificationError> {
		let mut new = self.clone();

		if let Some(required_parent) = modifications.required_parent.as_ref() {
			new.required_parent = required_parent.clone();
		}

		if let Some(ref hrmp_watermark) = modifications.hrmp_watermark {
			let watermarks = &mut new.hrmp_inbound.valid_watermarks;
			match watermarks.binary_search(&hrmp_watermark.watermark()) {
				Ok(pos) => {
					// Exact match, so this is OK in all cases.
					watermarks.drain(..pos + 1);
				},
				Err(pos) => match hrmp_watermark {
					// Not an exact match. Only valid when advancing to the relay-parent itself.
					HrmpWatermarkUpdate::Head(_) => {
						watermarks.drain(..pos);
					},
					HrmpWatermarkUpdate::Trunk(n) =>
						return Err(ModificationError::DisallowedHrmpWatermark(*n)),
				},
			}
		}

		for (id, outbound_hrmp_mod) in &modifications.outbound_hrmp {
			let outbound = new
				.hrmp_channels_out
				.get_mut(id)
				.ok_or(ModificationError::NoSuchHrmpChannel(*id))?;

			let (bytes_remaining, messages_remaining) =
				outbound_budget(outbound, *id, outbound_hrmp_mod)?;
			outbound.bytes_remaining = bytes_remaining;
			outbound.messages_remaining = messages_remaining;
		}

		let (ump_remaining, ump_remaining_bytes) = ump_budget(&new, modifications)?;
		new.ump_remaining = ump_remaining;
		new.ump_remaining_bytes = ump_remaining_bytes;

		if modifications.dmp_messages_processed > new.dmp_remaining_messages.len() {
			return Err(ModificationError::DmpMessagesUnderflow {
				messages_remaining: new.dmp_remaining_messages.len(),
				messages_processed: modifications.dmp_messages_processed,
			})
		}
		new.dmp_remaining_messages.drain(..modifications.dmp_messages_processed);

		if modifications.code_upgrade_applied {
			new.validation_code_hash = new
				.future_validation_code
				.take()
				.ok_or(ModificationError::AppliedNonexistentCodeUpgrade)?
				.1;
		}

		Ok(new)
	}
}

// Remaining (bytes, messages) of an outbound channel after the modification.
fn outbound_budget(
	outbound: &OutboundHrmpChannelLimitations,
	para_id: ParaId,
	modification: &OutboundHrmpChannelModification,
) -> Result<(usize, usize), ModificationError> {
	let bytes_remaining = outbound
		.bytes_remaining
		.checked_sub(modification.bytes_submitted)
		.ok_or(ModificationError::HrmpBytesOverflow {
			para_id,
			bytes_remaining: outbound.bytes_remaining,
			bytes_submitted: modification.bytes_submitted,
		})?;

	let messages_remaining = outbound
		.messages_remaining
		.checked_sub(modification.messages_submitted)
		.ok_or(ModificationError::HrmpMessagesOverflow {
			para_id,
			messages_remaining: outbound.messages_remaining,
			messages_submitted: modification.messages_submitted,
		})?;

	Ok((bytes_remaining, messages_remaining))
}

// Remaining (messages, bytes) of the upward queue after the modification.
fn ump_budget(
	constraints: &Constraints,
	modifications: &ConstraintModifications,
) -> Result<(usize, usize), ModificationError> {
	let messages = constraints
		.ump_remaining
		.checked_sub(modifications.ump_messages_sent)
		.ok_or(ModificationError::UmpMessagesOverflow {
			messages_remaining: constraints.ump_remaining,
			messages_submitted: modifications.ump_messages_sent,
		})?;

	let bytes = constraints
		.ump_remaining_bytes
		.checked_sub(modifications.ump_bytes_sent)
		.ok_or(ModificationError::UmpBytesOverflow {
			bytes_remaining: constraints.ump_remaining_bytes,
			bytes_submitted: modifications.ump_bytes_sent,
		})?;

	Ok((messages, bytes))
}

/// Information about a relay-chain block.
#[derive(Debug, Clone, PartialEq)]
pub struct RelayChainBlockInfo {
	/// The hash of the relay-chain block.
	pub hash: Hash,
	/// The number of the relay-chain block.
	pub number: BlockNumber,
	/// The storage-root of the relay-chain block.
	pub storage_root: Hash,
}

/// An update to outbound HRMP channels.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutboundHrmpChannelModification {
	/// The number of bytes submitted to the channel.
	pub bytes_submitted: usize,
	/// The number of messages submitted to the channel.
	pub messages_submitted: usize,
}

/// An update to the HRMP Watermark.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HrmpWatermarkUpdate {
	/// This is an update placing the watermark at the head of the chain,
	/// which is always legal.
	Head(BlockNumber),
	/// This is an update placing the watermark behind the head of the
	/// chain, which is only legal if it lands on a block where messages
	/// were queued.
	Trunk(BlockNumber),
}

impl HrmpWatermarkUpdate {
	fn watermark(&self) -> BlockNumber {
		match *self {
			HrmpWatermarkUpdate::Head(n) | HrmpWatermarkUpdate::Trunk(n) => n,
		}
	}
}

/// Modifications to constraints as a result of prospective candidates.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintModifications {
	/// The required parent head to build upon.
	pub required_parent: Option<HeadData>,
	/// The new HRMP watermark.
	pub hrmp_watermark: Option<HrmpWatermarkUpdate>,
	/// Outbound HRMP channel modifications.
	pub outbound_hrmp: HashMap<ParaId, OutboundHrmpChannelModification>,
	/// The amount of UMP messages sent.
	pub ump_messages_sent: usize,
	/// The amount of UMP bytes sent.
	pub ump_bytes_sent: usize,
	/// The amount of DMP messages processed.
	pub dmp_messages_processed: usize,
	/// Whether a pending code upgrade has been applied.
	pub code_upgrade_applied: bool,
}

impl ConstraintModifications {
	/// The 'identity' modifications: these can be applied to
	/// any constraints and yield the exact same result.
	pub fn identity() -> Self {
		ConstraintModifications {
			required_parent: None,
			hrmp_watermark: None,
			outbound_hrmp: HashMap::new(),
			ump_messages_sent: 0,
			ump_bytes_sent: 0,
			dmp_messages_processed: 0,
			code_upgrade_applied: false,
		}
	}

	/// Stack other modifications on top of these.
	///
	/// This does no sanity-checking, so if `other` is garbage relative
	/// to `self`, then the new value will be garbage as well.
	///
	/// This is an addition which is not commutative.
	pub fn stack(&mut self, other: &Self) {
		if let Some(ref new_parent) = other.required_parent {
			self.required_parent = Some(new_parent.clone());
		}
		if other.hrmp_watermark.is_some() {
			self.hrmp_watermark = other.hrmp_watermark;
		}

		for (id, mods) in &other.outbound_hrmp {
			let record = self.outbound_hrmp.entry(*id).or_default();
			record.messages_submitted += mods.messages_submitted;
			record.bytes_submitted += mods.bytes_submitted;
		}

		self.ump_messages_sent += other.ump_messages_sent;
		self.ump_bytes_sent += other.ump_bytes_sent;
		self.dmp_messages_processed += other.dmp_messages_processed;
		self.code_upgrade_applied |= other.code_upgrade_applied;
	}
}

/// The prospective candidate.
///
/// This comprises the key information that represent a candidate
/// without pinning it to a particular session. For example, everything
/// to do with the collator's signature and commitments are represented
/// here. But the erasure-root is not. This means that prospective candidates
/// are not correlated to any session in particular.
#[derive(Debug, Clone, PartialEq)]
pub struct ProspectiveCandidate {
	/// The commitments to the output of the execution.
	pub commitments: CandidateCommitments,
	/// The collator that created the candidate.
	pub collator: CollatorId,
	/// The signature of the collator on the payload.
	pub collator_signature: CollatorSignature,
	/// The persisted validation data used to create the candidate.
	pub persisted_validation_data: PersistedValidationData,
	/// The hash of the PoV.
	pub pov_hash: Hash,
	/// The validation code hash used by the candidate.
	pub validation_code_hash: ValidationCodeHash,
}

/// Kinds of errors with the validity of a fragment.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FragmentValidityError {
	/// The validation code of the candidate doesn't match the
	/// operating constraints.
	///
	/// Expected, Got
	#[error("Validation code mismatch: expected {0:?}, got {1:?}")]
	ValidationCodeMismatch(ValidationCodeHash, ValidationCodeHash),
	/// The persisted-validation-data doesn't match.
	///
	/// Expected, Got
	#[error("Persisted validation data mismatch: expected {0:?}, got {1:?}")]
	PersistedValidationDataMismatch(Box<PersistedValidationData>, Box<PersistedValidationData>),
	/// The outputs of the candidate are invalid under the operating
	/// constraints.
	#[error("Candidate outputs are invalid: {0}")]
	OutputsInvalid(ModificationError),
	/// New validation code size too big.
	///
	/// Max allowed, new.
	#[error("New validation code is too large: {1} bytes, at most {0} allowed")]
	CodeSizeTooLarge(usize, usize),
	/// Relay parent too old.
	///
	/// Min allowed, current.
	#[error("Relay parent {1} is older than the minimum {0}")]
	RelayParentTooOld(BlockNumber, BlockNumber),
	/// Para is required to process at least one DMP message from the queue.
	#[error("At least one pending downward message must be processed")]
	DmpAdvancementRule,
	/// Too many messages upward messages submitted.
	#[error("Too many upward messages: {messages_submitted} submitted, {messages_allowed} allowed")]
	UmpMessagesPerCandidateOverflow {
		/// The amount of messages a single candidate can submit.
		messages_allowed: usize,
		/// The amount of messages sent to all HRMP channels.
		messages_submitted: usize,
	},
	/// Too many messages submitted to all HRMP channels.
	#[error("Too many HRMP messages: {messages_submitted} submitted, {messages_allowed} allowed")]
	HrmpMessagesPerCandidateOverflow {
		/// The amount of messages a single candidate can submit.
		messages_allowed: usize,
		/// The amount of messages sent to all HRMP channels.
		messages_submitted: usize,
	},
	/// Code upgrade not allowed.
	#[error("Code upgrades are currently restricted")]
	CodeUpgradeRestricted,
	/// HRMP messages are not ascending or are duplicate.
	///
	/// The `usize` is the index into the outbound HRMP messages of
	/// the candidate.
	#[error("HRMP message {0} is not ascending by recipient")]
	HrmpMessagesDescendingOrDuplicate(usize),
}

/// A parachain fragment, representing another prospective parachain block.
///
/// This is a type which guarantees that the candidate is valid under the
/// operating constraints.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
	/// The new relay-parent.
	relay_parent: RelayChainBlockInfo,
	/// The constraints this fragment is operating under.
	operating_constraints: Constraints,
	/// The core information about the prospective candidate.
	candidate: Arc<ProspectiveCandidate>,
	/// Modifications to the constraints based on the outputs of
	/// the candidate.
	modifications: ConstraintModifications,
}

impl Fragment {
	/// Create a new fragment.
	///
	/// This fails if the fragment isn't in line with the operating
	/// constraints. That is, either its inputs or its outputs fail
	/// checks against the constraints.
	///
	/// This doesn't check that the collator signature is valid or
	/// whether the PoV is small enough.
	pub fn new(
		relay_parent: RelayChainBlockInfo,
		operating_constraints: Constraints,
		candidate: Arc<ProspectiveCandidate>,
	) -> Result<Self, FragmentValidityError> {
		let modifications = {
			let commitments = &candidate.commitments;
			ConstraintModifications {
				required_parent: Some(commitments.head_data.clone()),
				hrmp_watermark: Some({
					if commitments.hrmp_watermark == relay_parent.number {
						HrmpWatermarkUpdate::Head(commitments.hrmp_watermark)
					} else {
						HrmpWatermarkUpdate::Trunk(commitments.hrmp_watermark)
					}
				}),
				outbound_hrmp: outbound_hrmp_modifications(commitments)?,
				ump_messages_sent: commitments.upward_messages.len(),
				ump_bytes_sent: commitments.upward_messages.iter().map(|msg| msg.len()).sum(),
				dmp_messages_processed: commitments.processed_downward_messages as _,
				code_upgrade_applied: operating_constraints
					.future_validation_code
					.map_or(false, |(at, _)| relay_parent.number >= at),
			}
		};

		validate_against_constraints(
			&operating_constraints,
			&relay_parent,
			&candidate,
			&modifications,
		)?;

		Ok(Fragment { relay_parent, operating_constraints, candidate, modifications })
	}

	/// Access the relay parent information.
	pub fn relay_parent(&self) -> &RelayChainBlockInfo {
		&self.relay_parent
	}

	/// Access the operating constraints
	pub fn operating_constraints(&self) -> &Constraints {
		&self.operating_constraints
	}

	/// Access the underlying prospective candidate.
	pub fn candidate(&self) -> &ProspectiveCandidate {
		&self.candidate
	}

	/// Modifications to constraints based on the outputs of the candidate.
	pub fn constraint_modifications(&self) -> &ConstraintModifications {
		&self.modifications
	}
}

fn outbound_hrmp_modifications(
	commitments: &CandidateCommitments,
) -> Result<HashMap<ParaId, OutboundHrmpChannelModification>, FragmentValidityError> {
	let mut outbound_hrmp = HashMap::<_, OutboundHrmpChannelModification>::new();

	let mut last_recipient = None::<ParaId>;
	for (i, message) in commitments.horizontal_messages.iter().enumerate() {
		if let Some(last) = last_recipient {
			if last >= message.recipient {
				return Err(FragmentValidityError::HrmpMessagesDescendingOrDuplicate(i))
			}
		}

		last_recipient = Some(message.recipient);
		let record = outbound_hrmp.entry(message.recipient).or_default();

		record.bytes_submitted += message.data.len();
		record.messages_submitted += 1;
	}

	Ok(outbound_hrmp)
}

fn validate_against_constraints(
	constraints: &Constraints,
	relay_parent: &RelayChainBlockInfo,
	candidate: &ProspectiveCandidate,
	modifications: &ConstraintModifications,
) -> Result<(), FragmentValidityError> {
	let expected_pvd = PersistedValidationData {
		parent_head: constraints.required_parent.clone(),
		relay_parent_number: relay_parent.number,
		relay_parent_storage_root: relay_parent.storage_root,
		max_pov_size: constraints.max_pov_size,
	};

	if expected_pvd != candidate.persisted_validation_data {
		return Err(FragmentValidityError::PersistedValidationDataMismatch(
			Box::new(expected_pvd),
			Box::new(candidate.persisted_validation_data.clone()),
		))
	}

	if constraints.validation_code_hash != candidate.validation_code_hash {
		return Err(FragmentValidityError::ValidationCodeMismatch(
			constraints.validation_code_hash,
			candidate.validation_code_hash,
		))
	}

	if relay_parent.number < constraints.min_relay_parent_number {
		return Err(FragmentValidityError::RelayParentTooOld(
			constraints.min_relay_parent_number,
			relay_parent.number,
		))
	}

	if candidate.commitments.new_validation_code.is_some() &&
		constraints.upgrade_restriction == Some(UpgradeRestriction::Present)
	{
		return Err(FragmentValidityError::CodeUpgradeRestricted)
	}

	let announced_code_size = candidate
		.commitments
		.new_validation_code
		.as_ref()
		.map_or(0, |code| code.0.len());

	if announced_code_size > constraints.max_code_size {
		return Err(FragmentValidityError::CodeSizeTooLarge(
			constraints.max_code_size,
			announced_code_size,
		))
	}

	if modifications.dmp_messages_processed == 0 {
		if constraints
			.dmp_remaining_messages
			.first()
			.map_or(false, |&msg_sent_at| msg_sent_at <= relay_parent.number)
		{
			return Err(FragmentValidityError::DmpAdvancementRule)
		}
	}

	if candidate.commitments.horizontal_messages.len() > constraints.max_hrmp_num_per_candidate {
		return Err(FragmentValidityError::HrmpMessagesPerCandidateOverflow {
			messages_allowed: constraints.max_hrmp_num_per_candidate,
			messages_submitted: candidate.commitments.horizontal_messages.len(),
		})
	}

	if candidate.commitments.upward_messages.len() > constraints.max_ump_num_per_candidate {
		return Err(FragmentValidityError::UmpMessagesPerCandidateOverflow {
			messages_allowed: constraints.max_ump_num_per_candidate,
			messages_submitted: candidate.commitments.upward_messages.len(),
		})
	}

	constraints
		.check_modifications(modifications)
		.map_err(FragmentValidityError::OutputsInvalid)
}
