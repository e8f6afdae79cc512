//! GST computation.
//!
//! Line math: `taxable = quantity * rate * (1 - discount)`. Intra-state bills
//! split the line tax into equal CGST/SGST halves (paisa-level remainder to
//! SGST); inter-state bills assign the full tax to IGST. Rounding to a whole
//! rupee happens once, at document level, never per line.

use rxledger_core::{DomainResult, Paise, Percent, money};

use crate::bill::{BillLine, BillTotals};

/// Whether the company and counterparty share a GST state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaxRegime {
    IntraState,
    InterState,
}

impl TaxRegime {
    /// State comparison between the company's state and the counterparty's,
    /// both as GST state code strings.
    pub fn determine(company_state: &str, party_state: &str) -> Self {
        if company_state.trim().eq_ignore_ascii_case(party_state.trim()) {
            Self::IntraState
        } else {
            Self::InterState
        }
    }
}

/// Computed tax split for one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineTax {
    pub taxable: Paise,
    pub cgst: Paise,
    pub sgst: Paise,
    pub igst: Paise,
    pub line_total: Paise,
}

/// Tax split for one line; `quantity` is in the entered unit, matching `rate`.
pub fn compute_line_tax(
    quantity: i64,
    rate: Paise,
    discount: Percent,
    tax: Percent,
    regime: TaxRegime,
) -> DomainResult<LineTax> {
    let gross = money::amount(quantity, rate)?;
    let taxable = discount.remainder_of(gross)?;
    let total_tax = tax.of(taxable)?;

    let (cgst, sgst, igst) = match regime {
        TaxRegime::IntraState => {
            let cgst = total_tax / 2;
            (cgst, total_tax - cgst, 0)
        }
        TaxRegime::InterState => (0, 0, total_tax),
    };

    Ok(LineTax {
        taxable,
        cgst,
        sgst,
        igst,
        line_total: taxable + total_tax,
    })
}

/// Sum computed lines into document totals, applying the single round-off.
pub fn document_totals(lines: &[BillLine]) -> DomainResult<BillTotals> {
    let mut subtotal: Paise = 0;
    let mut discount: Paise = 0;
    let mut cgst: Paise = 0;
    let mut sgst: Paise = 0;
    let mut igst: Paise = 0;
    let mut raw_total: Paise = 0;

    for line in lines {
        let gross = money::amount(line.quantity, line.rate)?;
        subtotal += gross;
        discount += gross - line.taxable;
        cgst += line.cgst;
        sgst += line.sgst;
        igst += line.igst;
        raw_total += line.line_total;
    }

    let (grand_total, round_off) = money::round_to_rupee(raw_total);
    Ok(BillTotals {
        subtotal,
        discount,
        cgst,
        sgst,
        igst,
        round_off,
        grand_total,
    })
}
