use anchor_lang::prelude::Pubkey;
use crate::error::DecodeError;
use crate::utils::calculate_loan_repayment;

pub const DISCRIMINATOR_LEN: usize = 7;

pub type ListingDiscriminator = [u8; DISCRIMINATOR_LEN];

/// Leading tag of a `Listing` account: the first bytes of sha256("account:Listing")
pub const LISTING_DISCRIMINATOR: ListingDiscriminator = [218, 32, 50, 73, 43, 134, 26];

/// Byte range of one field in the serialized account.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub offset: usize,
    pub width: usize,
}

impl Field {
    pub const fn first(width: usize) -> Self {
        Self { offset: 0, width }
    }

    /// The field laid out directly after `self`
    pub const fn next(self, width: usize) -> Self {
        Self { offset: self.offset + self.width, width }
    }

    pub const fn end(self) -> usize {
        self.offset + self.width
    }
}

/// Offsets of the `Listing` account.
///
/// This table is the only place offsets are written down. The decoder reads
/// through it and the filter builder compares against it, so a layout change
/// here moves both. A layout change on-chain comes with a new discriminator.
pub mod layout {
    use super::{Field, DISCRIMINATOR_LEN};

    pub const DISCRIMINATOR: Field = Field::first(DISCRIMINATOR_LEN);
    pub const STATE: Field = DISCRIMINATOR.next(1);
    pub const AMOUNT: Field = STATE.next(8);
    pub const BORROWER: Field = AMOUNT.next(32);
    pub const LENDER: Field = BORROWER.next(32);
    pub const BASIS_POINTS: Field = LENDER.next(2);
    pub const DURATION: Field = BASIS_POINTS.next(8);
    pub const START_DATE: Field = DURATION.next(8);
    pub const ESCROW: Field = START_DATE.next(32);
    pub const MINT: Field = ESCROW.next(32);
    pub const BUMP: Field = MINT.next(1);
    pub const ESCROW_BUMP: Field = BUMP.next(1);

    /// Minimum account length; anything after this is program padding
    pub const LEN: usize = ESCROW_BUMP.end();
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ListingState {
    Initialized = 0,
    Listed = 1,
    Active = 2,
    Repaid = 3,
    Cancelled = 4,
    Defaulted = 5,
}

impl ListingState {
    /// Whether a lender has been recorded on the listing
    pub fn has_loan(self) -> bool {
        matches!(self, ListingState::Active | ListingState::Repaid | ListingState::Defaulted)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ListingState::Repaid | ListingState::Cancelled | ListingState::Defaulted)
    }

    /// Transitions the program allows. None of them reverse.
    pub fn can_transition_to(self, next: ListingState) -> bool {
        use ListingState::*;

        matches!(
            (self, next),
            (Initialized, Listed)
                | (Listed, Active)
                | (Listed, Cancelled)
                | (Active, Repaid)
                | (Active, Defaulted)
        )
    }
}

impl TryFrom<u8> for ListingState {
    type Error = DecodeError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ListingState::Initialized),
            1 => Ok(ListingState::Listed),
            2 => Ok(ListingState::Active),
            3 => Ok(ListingState::Repaid),
            4 => Ok(ListingState::Cancelled),
            5 => Ok(ListingState::Defaulted),
            other => Err(DecodeError::UnknownState(other)),
        }
    }
}

/// Fields set when a lender takes the listing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ActiveLoan {
    /// The issuer of the loan
    pub lender: Pubkey,
    /// The start date of the loan
    pub start_date: i64,
}

impl ActiveLoan {
    pub fn is_overdue(&self, duration: u64, unix_timestamp: i64) -> bool {
        let elapsed = unix_timestamp.saturating_sub(self.start_date);
        elapsed >= 0 && elapsed as u64 >= duration
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListingStatus {
    Initialized,
    Listed,
    Active(ActiveLoan),
    Repaid(ActiveLoan),
    Cancelled,
    Defaulted(ActiveLoan),
}

impl ListingStatus {
    pub fn state(&self) -> ListingState {
        match self {
            ListingStatus::Initialized => ListingState::Initialized,
            ListingStatus::Listed => ListingState::Listed,
            ListingStatus::Active(_) => ListingState::Active,
            ListingStatus::Repaid(_) => ListingState::Repaid,
            ListingStatus::Cancelled => ListingState::Cancelled,
            ListingStatus::Defaulted(_) => ListingState::Defaulted,
        }
    }

    pub fn loan(&self) -> Option<&ActiveLoan> {
        match self {
            ListingStatus::Active(loan)
            | ListingStatus::Repaid(loan)
            | ListingStatus::Defaulted(loan) => Some(loan),
            _ => None,
        }
    }

    fn from_parts(state: ListingState, loan: ActiveLoan) -> Self {
        match state {
            ListingState::Initialized => ListingStatus::Initialized,
            ListingState::Listed => ListingStatus::Listed,
            ListingState::Active => ListingStatus::Active(loan),
            ListingState::Repaid => ListingStatus::Repaid(loan),
            ListingState::Cancelled => ListingStatus::Cancelled,
            ListingState::Defaulted => ListingStatus::Defaulted(loan),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Listing {
    pub status: ListingStatus,
    /// The amount of the loan in lamports
    pub amount: u64,
    /// The NFT holder
    pub borrower: Pubkey,
    /// Annualized return
    pub basis_points: u16,
    /// Duration of the loan in seconds
    pub duration: u64,
    /// The escrow where the collateral NFT is held
    pub escrow: Pubkey,
    /// The mint of the token being used for collateral
    pub mint: Pubkey,
    /// Misc
    pub bump: u8,
    pub escrow_bump: u8,
}

impl Listing {
    pub fn state(&self) -> ListingState {
        self.status.state()
    }

    pub fn lender(&self) -> Option<Pubkey> {
        self.status.loan().map(|loan| loan.lender)
    }

    /// Reads one account. Fails rather than returning a partial record.
    pub fn decode(data: &[u8], discriminator: &ListingDiscriminator) -> Result<Self, DecodeError> {
        if data.len() < layout::LEN {
            return Err(DecodeError::TooShort {
                expected: layout::LEN,
                actual: data.len(),
            });
        }

        let tag: ListingDiscriminator = read(data, layout::DISCRIMINATOR)?;
        if &tag != discriminator {
            return Err(DecodeError::DiscriminatorMismatch {
                expected: discriminator.to_vec(),
                actual: tag.to_vec(),
            });
        }

        let [state] = read::<1>(data, layout::STATE)?;
        let state = ListingState::try_from(state)?;
        let loan = ActiveLoan {
            lender: Pubkey::new_from_array(read(data, layout::LENDER)?),
            start_date: i64::from_le_bytes(read(data, layout::START_DATE)?),
        };
        let [bump] = read::<1>(data, layout::BUMP)?;
        let [escrow_bump] = read::<1>(data, layout::ESCROW_BUMP)?;

        Ok(Listing {
            status: ListingStatus::from_parts(state, loan),
            amount: u64::from_le_bytes(read(data, layout::AMOUNT)?),
            borrower: Pubkey::new_from_array(read(data, layout::BORROWER)?),
            basis_points: u16::from_le_bytes(read(data, layout::BASIS_POINTS)?),
            duration: u64::from_le_bytes(read(data, layout::DURATION)?),
            escrow: Pubkey::new_from_array(read(data, layout::ESCROW)?),
            mint: Pubkey::new_from_array(read(data, layout::MINT)?),
            bump,
            escrow_bump,
        })
    }

    /// Writes the account the way the program lays it out. Loan fields are
    /// zeroed when the status carries none.
    pub fn encode(&self, discriminator: &ListingDiscriminator) -> Vec<u8> {
        let mut data = vec![0u8; layout::LEN];

        write(&mut data, layout::DISCRIMINATOR, discriminator);
        write(&mut data, layout::STATE, &[self.state() as u8]);
        write(&mut data, layout::AMOUNT, &self.amount.to_le_bytes());
        write(&mut data, layout::BORROWER, self.borrower.as_ref());
        if let Some(loan) = self.status.loan() {
            write(&mut data, layout::LENDER, loan.lender.as_ref());
            write(&mut data, layout::START_DATE, &loan.start_date.to_le_bytes());
        }
        write(&mut data, layout::BASIS_POINTS, &self.basis_points.to_le_bytes());
        write(&mut data, layout::DURATION, &self.duration.to_le_bytes());
        write(&mut data, layout::ESCROW, self.escrow.as_ref());
        write(&mut data, layout::MINT, self.mint.as_ref());
        write(&mut data, layout::BUMP, &[self.bump]);
        write(&mut data, layout::ESCROW_BUMP, &[self.escrow_bump]);

        data
    }

    /// Principal plus pro-rata interest owed at `unix_timestamp`
    pub fn amount_due(&self, unix_timestamp: i64) -> Option<u64> {
        let loan = self.status.loan()?;
        let elapsed = unix_timestamp.saturating_sub(loan.start_date).max(0) as u64;
        calculate_loan_repayment(self.amount, self.basis_points, elapsed)
    }

    pub fn is_overdue(&self, unix_timestamp: i64) -> bool {
        match self.status {
            ListingStatus::Active(loan) => loan.is_overdue(self.duration, unix_timestamp),
            _ => false,
        }
    }
}

/// A decoded listing and the address it was read from
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListingAccount {
    pub pubkey: Pubkey,
    pub listing: Listing,
}

fn read<const N: usize>(data: &[u8], field: Field) -> Result<[u8; N], DecodeError> {
    data.get(field.offset..field.end())
        .and_then(|bytes| bytes.try_into().ok())
        .ok_or(DecodeError::TooShort {
            expected: field.end(),
            actual: data.len(),
        })
}

fn write(data: &mut [u8], field: Field, bytes: &[u8]) {
    data[field.offset..field.end()].copy_from_slice(bytes);
}
