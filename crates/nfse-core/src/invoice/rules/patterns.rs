//! Common regex patterns for NFS-e field extraction.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Issuer CNPJ glued to the municipal registration label (defragmented text)
    pub static ref CNPJ_AFTER_INSC: Regex = Regex::new(
        r"InscMunicipal(\d{2}\.\d{3}\.\d{3}/\d{4}-\d{2})"
    ).unwrap();

    pub static ref CNPJ_FORMATTED: Regex = Regex::new(
        r"^\d{2}\.\d{3}\.\d{3}/\d{4}-\d{2}$"
    ).unwrap();

    // NFS-e number (defragmented text)
    pub static ref INVOICE_NUMBER: Regex = Regex::new(
        r"NúmerodaNFS-e\s*(\d+)"
    ).unwrap();

    // Layout-specific anchor for the service value (raw text)
    pub static ref GROSS_VALUE: Regex = Regex::new(
        r"\(-\) Desconto Condicionado\s*(\d+(?:\.\d{3})*,\d{2})"
    ).unwrap();

    // Brazilian amount: 1.234,56
    pub static ref BRAZILIAN_AMOUNT: Regex = Regex::new(
        r"^\d+(?:\.\d{3})*,\d+$"
    ).unwrap();

    // Plain decimal: 1234.56
    pub static ref PLAIN_DECIMAL: Regex = Regex::new(
        r"^\d+(?:\.\d+)?$"
    ).unwrap();

    // Dates
    pub static ref DATE_DMY: Regex = Regex::new(
        r"^(\d{1,2})[./\-](\d{1,2})[./\-](\d{4})$"
    ).unwrap();

    pub static ref DATE_YMD: Regex = Regex::new(
        r"^(\d{4})[./\-](\d{1,2})[./\-](\d{1,2})(?:[T ].*)?$"
    ).unwrap();

    // Competence
    pub static ref COMPETENCE_MY: Regex = Regex::new(
        r"^(\d{1,2})[./\-](\d{4})$"
    ).unwrap();

    pub static ref COMPETENCE_YM: Regex = Regex::new(
        r"^(\d{4})[./\-](\d{1,2})$"
    ).unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_patterns() {
        let caps = CNPJ_AFTER_INSC
            .captures("xxInscMunicipal12.345.678/0001-90yy")
            .unwrap();
        assert_eq!(&caps[1], "12.345.678/0001-90");

        let caps = INVOICE_NUMBER.captures("NúmerodaNFS-e  42").unwrap();
        assert_eq!(&caps[1], "42");

        let caps = GROSS_VALUE
            .captures("(-) Desconto Condicionado 1.234,56 R$")
            .unwrap();
        assert_eq!(&caps[1], "1.234,56");
    }

    #[test]
    fn test_patterns_are_case_sensitive() {
        assert!(!INVOICE_NUMBER.is_match("númerodanfs-e 42"));
        assert!(!CNPJ_AFTER_INSC.is_match("inscmunicipal12.345.678/0001-90"));
    }
}
