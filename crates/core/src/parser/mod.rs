//! Field recovery from announcement text.
//!
//! Each field has an ordered list of independent rules; the first rule that
//! recognises the document wins and a rule that does not match simply leaves
//! the field to the next one. Nothing here fails: a document the rules do not
//! understand becomes a partial record that is routed to manual review.

pub mod dates;
pub mod rules;

use crate::config::ParserSettings;
use crate::models::{AnnouncementDescriptor, Classified, DateSource, ParsedAnnouncement, SuspensionRecord};
use chrono::NaiveDate;
use rules::{
    AnnouncementDateRule, DateRule, DecisionSections, KeywordDateRule, LabelledReasonRule,
    LabelledTickerRule, ListedCodeRule, ParenthesisedTickerRule, ReasonCatalogueRule, ReasonRule,
    SectionDate, SymbolRule,
};
use tracing::{debug, warn};

pub use dates::{month_number, DateScanner};
pub use rules::FieldRule;

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// What every rule sees: the text with its layout, a whitespace-collapsed
/// copy, the descriptor, and the ticker once symbol rules have run.
pub struct ParseInput<'a> {
    pub text: &'a str,
    pub normalized: String,
    pub descriptor: &'a AnnouncementDescriptor,
    pub symbol: Option<String>,
}

impl<'a> ParseInput<'a> {
    pub fn new(text: &'a str, descriptor: &'a AnnouncementDescriptor) -> Self {
        Self {
            text,
            normalized: normalize_whitespace(text),
            descriptor,
            symbol: None,
        }
    }
}

pub struct FieldParser {
    symbol_rules: Vec<SymbolRule>,
    date_rules: Vec<DateRule>,
    reason_rules: Vec<ReasonRule>,
    sections: Option<DecisionSections>,
    settings: ParserSettings,
}

impl FieldParser {
    /// Parser with the rule set tuned to the exchange's suspension letters.
    pub fn new(settings: ParserSettings) -> Result<Self, regex::Error> {
        let mut parser = Self::with_rules(
            settings,
            vec![
                Box::new(LabelledTickerRule::new()?),
                Box::new(ListedCodeRule),
                Box::new(ParenthesisedTickerRule::new()?),
            ],
            vec![Box::new(KeywordDateRule::new()?), Box::new(AnnouncementDateRule)],
            vec![Box::new(LabelledReasonRule::new()?), Box::new(ReasonCatalogueRule)],
        );
        parser.sections = Some(DecisionSections::new()?);
        Ok(parser)
    }

    pub fn with_rules(
        settings: ParserSettings,
        symbol_rules: Vec<SymbolRule>,
        date_rules: Vec<DateRule>,
        reason_rules: Vec<ReasonRule>,
    ) -> Self {
        Self {
            symbol_rules,
            date_rules,
            reason_rules,
            sections: None,
            settings,
        }
    }

    /// One record per company the announcement suspends. Single-company
    /// announcements, and multi-company ones whose decision names no codes,
    /// go through [`FieldParser::parse`].
    pub fn parse_all(&self, text: &str, descriptor: &AnnouncementDescriptor) -> Vec<ParsedAnnouncement> {
        let Some(sections) = self.sections.as_ref().filter(|_| descriptor.covers_several_codes()) else {
            return vec![self.parse(text, descriptor)];
        };

        let mut input = ParseInput::new(text, descriptor);
        let listed = sections.symbols(&input.normalized);
        if listed.is_empty() {
            debug!(url = %descriptor.document_url, "no codes in multi-company letter");
            return vec![self.parse(text, descriptor)];
        }

        let document_date = first_match(&self.date_rules, &input);
        let mut parsed = Vec::with_capacity(listed.len());
        for entry in listed {
            let symbol = self.with_suffix(entry.symbol);
            input.symbol = Some(symbol.clone());
            let dated = match entry.date {
                SectionDate::Stated(date) => Some((date, DateSource::Text)),
                SectionDate::Undated => None,
                SectionDate::Document => document_date,
            };
            let reason = first_match(&self.reason_rules, &input);
            parsed.push(assemble(descriptor, Some(symbol), dated, reason));
        }

        debug!(url = %descriptor.document_url, records = parsed.len(), "parsed multi-company letter");
        parsed
    }

    pub fn parse(&self, text: &str, descriptor: &AnnouncementDescriptor) -> ParsedAnnouncement {
        let mut input = ParseInput::new(text, descriptor);

        let symbol = first_match(&self.symbol_rules, &input).map(|ticker| self.with_suffix(ticker));
        input.symbol = symbol.clone();

        let dated = first_match(&self.date_rules, &input);
        let reason = first_match(&self.reason_rules, &input);

        debug!(
            url = %descriptor.document_url,
            symbol = ?symbol,
            date = ?dated.map(|(date, _)| date),
            has_reason = reason.is_some(),
            "parsed announcement"
        );

        assemble(descriptor, symbol, dated, reason)
    }

    /// Complete when symbol, suspension date and document URL are all set.
    pub fn classify(&self, record: SuspensionRecord) -> Classified {
        if !record.has_required_fields() {
            return Classified::Incomplete(record);
        }
        if self.settings.require_reason && !record.has_reason() {
            warn!(
                url = %record.pdf_url,
                "reason missing on otherwise complete record, routing to fallback"
            );
            return Classified::Incomplete(record);
        }
        Classified::Complete(record)
    }

    fn with_suffix(&self, ticker: String) -> String {
        let suffix = self.settings.symbol_suffix.as_str();
        if suffix.is_empty() || ticker.ends_with(suffix) {
            ticker
        } else {
            format!("{ticker}{suffix}")
        }
    }
}

fn assemble(
    descriptor: &AnnouncementDescriptor,
    symbol: Option<String>,
    dated: Option<(NaiveDate, DateSource)>,
    reason: Option<String>,
) -> ParsedAnnouncement {
    ParsedAnnouncement {
        record: SuspensionRecord {
            symbol,
            suspension_date: dated.map(|(date, _)| date),
            reason,
            pdf_url: descriptor.document_url.clone(),
        },
        date_source: dated.map(|(_, source)| source),
    }
}

fn first_match<T>(rules: &[Box<dyn FieldRule<T>>], input: &ParseInput<'_>) -> Option<T> {
    rules.iter().find_map(|rule| {
        let value = rule.apply(input);
        if value.is_some() {
            debug!(rule = rule.name(), "rule matched");
        }
        value
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Verdict;

    pub(crate) const WELL_FORMED: &str = "PENGUMUMAN
Penghentian Sementara Perdagangan Efek
Kode Saham : ABCD
Nama Perusahaan : PT Abcd Tbk
Bursa memutuskan penghentian sementara perdagangan efek pada tanggal 15 Januari 2024 Sesi II
Alasan :
Terjadinya peningkatan harga kumulatif yang signifikan
pada saham ABCD
Demikian untuk diketahui.";

    const MULTI_COMPANY: &str = "PENGUMUMAN
Penghentian Sementara Perdagangan Efek
Atas dasar hal tersebut di atas, Bursa memutuskan untuk:
a. Melakukan penghentian sementara perdagangan saham PT Abcd Tbk. (ABCD)
dan PT Efgh Tbk. (EFGH) di Pasar Reguler sejak Sesi I tanggal 15 Januari 2024;
b. Melanjutkan penghentian sementara perdagangan saham PT Ijkl Tbk. (IJKL).
Terjadi peningkatan harga kumulatif yang signifikan.";

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid test date")
    }

    fn descriptor() -> AnnouncementDescriptor {
        AnnouncementDescriptor::new("https://www.idx.co.id/StaticData/abcd.pdf", date(2024, 1, 14))
    }

    fn parser() -> FieldParser {
        FieldParser::new(ParserSettings::default()).expect("rules compile")
    }

    #[test]
    fn well_formed_letter_yields_every_field() {
        let parsed = parser().parse(WELL_FORMED, &descriptor());

        assert_eq!(parsed.record.symbol.as_deref(), Some("ABCD"));
        assert_eq!(parsed.record.suspension_date, Some(date(2024, 1, 15)));
        assert_eq!(parsed.date_source, Some(DateSource::Text));
        assert_eq!(
            parsed.record.reason.as_deref(),
            Some("Terjadinya peningkatan harga kumulatif yang signifikan pada saham ABCD")
        );
        assert_eq!(parsed.record.pdf_url, "https://www.idx.co.id/StaticData/abcd.pdf");
    }

    #[test]
    fn missing_date_label_falls_back_to_announcement_date() {
        let text = "Kode Saham : ABCD\nAlasan :\nCooling down";
        let parsed = parser().parse(text, &descriptor());

        assert_eq!(parsed.record.suspension_date, Some(date(2024, 1, 14)));
        assert_eq!(parsed.date_source, Some(DateSource::Announcement));
        assert_eq!(parser().classify(parsed.record).verdict(), Verdict::Complete);
    }

    #[test]
    fn second_session_date_wins_over_later_dates() {
        let text = "Bursa melakukan penghentian sementara perdagangan Sesi II tanggal 12 Januari 2024. \
                    Suspensi dicabut pada tanggal 20 Januari 2024.";
        let parsed = parser().parse(text, &descriptor());
        assert_eq!(parsed.record.suspension_date, Some(date(2024, 1, 12)));
    }

    #[test]
    fn last_candidate_wins_without_session_mention() {
        let text = "tanggal 3 Januari 2024 surat masuk. Suspensi berlaku tanggal 5 Januari 2024.";
        let parsed = parser().parse(text, &descriptor());
        assert_eq!(parsed.record.suspension_date, Some(date(2024, 1, 5)));
    }

    #[test]
    fn symbol_rules_fall_through_in_order() {
        let from_parentheses = parser().parse("Saham PT Wxyz Tbk. (WXYZ) dihentikan", &descriptor());
        assert_eq!(from_parentheses.record.symbol.as_deref(), Some("WXYZ"));

        let mut listed = descriptor();
        listed.listed_code = Some("EFGH".to_string());
        let from_listing = parser().parse("tanpa kode", &listed);
        assert_eq!(from_listing.record.symbol.as_deref(), Some("EFGH"));

        let nothing = parser().parse("tanpa kode", &descriptor());
        assert_eq!(nothing.record.symbol, None);
    }

    #[test]
    fn listed_code_outranks_quoted_acronyms() {
        let mut listed = descriptor();
        listed.listed_code = Some("ABCD".to_string());
        let text = "Merujuk surat (KSEI) tanggal 10 Januari 2024, saham PT Abcd Tbk. (ABCD) dihentikan";

        let parsed = parser().parse(text, &listed);
        assert_eq!(parsed.record.symbol.as_deref(), Some("ABCD"));
    }

    #[test]
    fn multi_company_letter_yields_a_record_per_code() {
        let mut several = descriptor();
        several.listed_code = Some(">1 kode".to_string());
        several.title = Some("Penghentian Sementara Perdagangan Efek (>1 Kode)".to_string());

        let parsed = parser().parse_all(MULTI_COMPANY, &several);

        let symbols: Vec<Option<&str>> = parsed.iter().map(|entry| entry.record.symbol.as_deref()).collect();
        assert_eq!(symbols, vec![Some("ABCD"), Some("EFGH"), Some("IJKL")]);
        assert_eq!(parsed[0].record.suspension_date, Some(date(2024, 1, 15)));
        assert_eq!(parsed[1].record.suspension_date, Some(date(2024, 1, 15)));
        assert_eq!(parsed[2].record.suspension_date, None);
        assert!(parsed
            .iter()
            .all(|entry| entry.record.pdf_url == "https://www.idx.co.id/StaticData/abcd.pdf"));
        assert_eq!(
            parsed[1].record.reason.as_deref(),
            Some("Terjadinya peningkatan harga kumulatif yang signifikan pada saham EFGH")
        );
    }

    #[test]
    fn single_company_letter_is_one_record_even_with_several_tickers() {
        let parsed = parser().parse_all(MULTI_COMPANY, &descriptor());
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].record.symbol.as_deref(), Some("ABCD"));
    }

    #[test]
    fn later_rule_misses_do_not_undo_earlier_fields() {
        let parsed = parser().parse("Kode Saham : ABCD", &descriptor());
        assert_eq!(parsed.record.symbol.as_deref(), Some("ABCD"));
        assert_eq!(parsed.record.reason, None);
    }

    #[test]
    fn catalogue_reason_uses_the_suffixed_symbol() {
        let settings = ParserSettings {
            symbol_suffix: ".JK".to_string(),
            require_reason: false,
        };
        let parser = FieldParser::new(settings).expect("rules compile");
        let text = "Kode Efek: ABCD. Terjadi peningkatan harga kumulatif yang signifikan, \
                    dalam rangka cooling down sebagai bentuk perlindungan bagi investor.";

        let parsed = parser.parse(text, &descriptor());
        assert_eq!(parsed.record.symbol.as_deref(), Some("ABCD.JK"));
        assert_eq!(
            parsed.record.reason.as_deref(),
            Some("Terjadinya peningkatan harga kumulatif yang signifikan pada saham ABCD.JK, dalam rangka cooling down sebagai bentuk perlindungan bagi investor")
        );
    }

    #[test]
    fn suffix_is_not_doubled() {
        let settings = ParserSettings {
            symbol_suffix: ".JK".to_string(),
            require_reason: false,
        };
        let parser = FieldParser::new(settings).expect("rules compile");
        assert_eq!(parser.with_suffix("ABCD.JK".to_string()), "ABCD.JK");
    }

    #[test]
    fn classification_follows_required_fields() {
        let parser = parser();
        let complete = SuspensionRecord {
            symbol: Some("ABCD".to_string()),
            suspension_date: Some(date(2024, 1, 15)),
            reason: None,
            pdf_url: "https://idx.test/a.pdf".to_string(),
        };
        assert_eq!(parser.classify(complete.clone()).verdict(), Verdict::Complete);

        let no_symbol = SuspensionRecord {
            symbol: None,
            ..complete.clone()
        };
        assert_eq!(parser.classify(no_symbol).verdict(), Verdict::Incomplete);

        let empty_symbol = SuspensionRecord {
            symbol: Some(String::new()),
            ..complete.clone()
        };
        assert_eq!(parser.classify(empty_symbol).verdict(), Verdict::Incomplete);

        let no_url = SuspensionRecord {
            pdf_url: " ".to_string(),
            ..complete.clone()
        };
        assert_eq!(parser.classify(no_url).verdict(), Verdict::Incomplete);

        let no_date = SuspensionRecord {
            suspension_date: None,
            ..complete
        };
        assert_eq!(parser.classify(no_date).verdict(), Verdict::Incomplete);
    }

    #[test]
    fn strict_mode_routes_reasonless_records_to_fallback() {
        let settings = ParserSettings {
            symbol_suffix: String::new(),
            require_reason: true,
        };
        let parser = FieldParser::new(settings).expect("rules compile");
        let parsed = parser.parse("Kode Saham : ABCD", &descriptor());
        assert_eq!(parser.classify(parsed.record).verdict(), Verdict::Incomplete);
    }

    #[test]
    fn custom_rule_sets_can_be_assembled() {
        struct Fixed;
        impl FieldRule<String> for Fixed {
            fn name(&self) -> &'static str {
                "fixed"
            }
            fn apply(&self, _input: &ParseInput<'_>) -> Option<String> {
                Some("ZZZZ".to_string())
            }
        }

        let parser = FieldParser::with_rules(ParserSettings::default(), vec![Box::new(Fixed)], vec![], vec![]);
        let parsed = parser.parse("", &descriptor());
        assert_eq!(parsed.record.symbol.as_deref(), Some("ZZZZ"));
        assert_eq!(parsed.record.suspension_date, None);
        assert_eq!(parsed.date_source, None);
    }
}
