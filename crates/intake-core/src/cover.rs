//! Cover plan catalogue

use crate::types::CoverOption;

/// Pricing and limits of one cover plan
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverPlan {
    /// Option this plan backs
    pub option: CoverOption,
    /// Display name
    pub name: &'static str,
    /// Monthly premium in rand
    pub monthly_premium: u32,
    /// Legal expense limit in rand
    pub legal_expense_limit: u32,
    /// Public liability limit in rand
    pub liability_limit: u32,
}

const ESSENTIAL: CoverPlan = CoverPlan {
    option: CoverOption::OptionA,
    name: "Essential Cover",
    monthly_premium: 135,
    legal_expense_limit: 100_000,
    liability_limit: 100_000,
};

const COMPREHENSIVE: CoverPlan = CoverPlan {
    option: CoverOption::OptionB,
    name: "Comprehensive Cover",
    monthly_premium: 245,
    legal_expense_limit: 300_000,
    liability_limit: 300_000,
};

impl CoverPlan {
    /// Plan for a selected option
    #[must_use]
    pub const fn for_option(option: CoverOption) -> &'static Self {
        match option {
            CoverOption::OptionA => &ESSENTIAL,
            CoverOption::OptionB => &COMPREHENSIVE,
        }
    }
}

/// Format a whole-rand amount, e.g. `R100 000`
#[must_use]
pub fn format_rand(amount: u32) -> String {
    let digits = amount.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 + 1);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }
    format!("R{grouped}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn catalogue_matches_options() {
        for option in CoverOption::ALL {
            assert_eq!(CoverPlan::for_option(*option).option, *option);
        }
        assert_eq!(CoverPlan::for_option(CoverOption::OptionB).monthly_premium, 245);
    }

    #[test]
    fn rand_amounts_are_grouped() {
        assert_eq!(format_rand(0), "R0");
        assert_eq!(format_rand(135), "R135");
        assert_eq!(format_rand(1_000), "R1 000");
        assert_eq!(format_rand(300_000), "R300 000");
        assert_eq!(format_rand(1_250_000), "R1 250 000");
    }
}
