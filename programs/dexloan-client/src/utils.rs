use crate::constants::*;

pub fn calculate_fee_from_basis_points(amount: u128, basis_points: u128) -> Option<u64> {
    let total_fee = basis_points.checked_mul(amount)?.checked_div(BASIS_POINTS_PER_UNIT as u128)?;

    u64::try_from(total_fee).ok()
}

/// Principal plus the annual interest pro-rated over `elapsed` seconds
pub fn calculate_loan_repayment(amount: u64, basis_points: u16, elapsed: u64) -> Option<u64> {
    let annual_fee = calculate_fee_from_basis_points(amount as u128, basis_points as u128)?;
    let pro_rata_fee = (annual_fee as f64 * elapsed as f64 / SECONDS_PER_YEAR as f64).round();

    amount.checked_add(pro_rata_fee as u64)
}

/// SOL to lamports, rounded to the nearest lamport
pub fn sol_to_lamports(amount: f64) -> Option<u64> {
    let lamports = (amount * LAMPORTS_PER_SOL as f64).round();

    if !lamports.is_finite() || lamports <= 0.0 || lamports > u64::MAX as f64 {
        return None;
    }

    Some(lamports as u64)
}

/// A fractional annual rate (0.1 is 10%) to basis points
pub fn rate_to_basis_points(rate: f64) -> Option<u16> {
    let basis_points = (rate * BASIS_POINTS_PER_UNIT as f64).round();

    if !basis_points.is_finite() || basis_points < 0.0 || basis_points > u16::MAX as f64 {
        return None;
    }

    Some(basis_points as u16)
}

pub fn months_to_seconds(months: u32) -> u64 {
    months as u64 * DAYS_PER_MONTH * SECONDS_PER_DAY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_form_units() {
        assert_eq!(sol_to_lamports(1.5), Some(1_500_000_000));
        assert_eq!(sol_to_lamports(0.1), Some(100_000_000));
        assert_eq!(rate_to_basis_points(0.10), Some(1_000));
        assert_eq!(rate_to_basis_points(6.5), Some(65_000));
        assert_eq!(months_to_seconds(3), 7_776_000);
    }

    #[test]
    fn rejects_unrepresentable_units() {
        assert_eq!(sol_to_lamports(0.0), None);
        assert_eq!(sol_to_lamports(-1.0), None);
        assert_eq!(sol_to_lamports(f64::NAN), None);
        assert_eq!(rate_to_basis_points(-0.01), None);
        assert_eq!(rate_to_basis_points(7.0), None);
    }

    #[test]
    fn repayment_is_pro_rata() {
        let amount = 1_000_000_000;

        assert_eq!(calculate_loan_repayment(amount, 1_000, 0), Some(amount));
        assert_eq!(
            calculate_loan_repayment(amount, 1_000, SECONDS_PER_YEAR),
            Some(1_100_000_000)
        );
        assert_eq!(
            calculate_loan_repayment(amount, 1_000, SECONDS_PER_YEAR / 2),
            Some(1_050_000_000)
        );
    }
}
