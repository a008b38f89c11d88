use super::dates::DateScanner;
use super::ParseInput;
use crate::models::DateSource;
use chrono::NaiveDate;
use regex::Regex;

/// One independent way of recovering a field. Rules never fail; a rule that
/// does not recognise the document returns `None`.
pub trait FieldRule<T>: Send + Sync {
    fn name(&self) -> &'static str;

    fn apply(&self, input: &ParseInput<'_>) -> Option<T>;
}

pub type SymbolRule = Box<dyn FieldRule<String>>;
pub type DateRule = Box<dyn FieldRule<(NaiveDate, DateSource)>>;
pub type ReasonRule = Box<dyn FieldRule<String>>;

const TICKER_PATTERN: &str = r"\b([A-Z]{4})\b";

/// Ticker on a `Kode Saham`-style label line, or on the first non-empty
/// line after it.
pub struct LabelledTickerRule {
    label: Regex,
    ticker: Regex,
}

impl LabelledTickerRule {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            label: Regex::new(
                r"(?i)\b(?:kode\s+saham|kode\s+efek|kode\s+perusahaan|stock\s+code|ticker)\b\s*:?(?P<rest>.*)$",
            )?,
            ticker: Regex::new(TICKER_PATTERN)?,
        })
    }

    fn ticker_in(&self, text: &str) -> Option<String> {
        self.ticker
            .captures(text)
            .and_then(|captures| captures.get(1))
            .map(|ticker| ticker.as_str().to_string())
    }
}

impl FieldRule<String> for LabelledTickerRule {
    fn name(&self) -> &'static str {
        "labelled-ticker"
    }

    fn apply(&self, input: &ParseInput<'_>) -> Option<String> {
        let lines: Vec<&str> = input.text.lines().collect();

        for (index, line) in lines.iter().enumerate() {
            let Some(captures) = self.label.captures(line) else {
                continue;
            };
            let rest = captures.name("rest").map_or("", |rest| rest.as_str());
            if let Some(ticker) = self.ticker_in(rest) {
                return Some(ticker);
            }
            let next_line = lines[index + 1..]
                .iter()
                .map(|line| line.trim())
                .find(|line| !line.is_empty());
            if let Some(ticker) = next_line.and_then(|line| self.ticker_in(line)) {
                return Some(ticker);
            }
        }

        None
    }
}

/// First `(ABCD)` token, as in `PT Abcd Tbk. (ABCD)`.
pub struct ParenthesisedTickerRule {
    pattern: Regex,
}

impl ParenthesisedTickerRule {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(r"\(\s*([A-Z]{4})\s*\)")?,
        })
    }
}

impl FieldRule<String> for ParenthesisedTickerRule {
    fn name(&self) -> &'static str {
        "parenthesised-ticker"
    }

    fn apply(&self, input: &ParseInput<'_>) -> Option<String> {
        self.pattern
            .captures(input.text)
            .and_then(|captures| captures.get(1))
            .map(|ticker| ticker.as_str().to_string())
    }
}

/// Ticker the listing attached to the announcement. Ranked ahead of the
/// parenthesised rule, since letters often quote other bodies as `(KSEI)`.
pub struct ListedCodeRule;

impl FieldRule<String> for ListedCodeRule {
    fn name(&self) -> &'static str {
        "listed-code"
    }

    fn apply(&self, input: &ParseInput<'_>) -> Option<String> {
        if input.descriptor.covers_several_codes() {
            return None;
        }
        let code = input.descriptor.listed_code.as_deref()?.trim().to_uppercase();
        let well_formed = code.len() == 4 && code.chars().all(|c| c.is_ascii_uppercase());
        well_formed.then_some(code)
    }
}

/// Where a ticker of a multi-company letter takes its suspension date from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionDate {
    /// Stated in the same decision item.
    Stated(NaiveDate),
    /// Listed in an item that carries no date of its own.
    Undated,
    /// No decision items; the document-wide date rules apply.
    Document,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionedSymbol {
    pub symbol: String,
    pub date: SectionDate,
}

/// Reads the lettered decision of a letter that suspends several companies
/// at once. Item `a.` names the companies suspended from a stated date;
/// item `b.` names companies whose suspension continues. Without lettered
/// items, a numbered list of codes is used instead.
pub struct DecisionSections {
    decision: Regex,
    items: Regex,
    ticker: Regex,
    numbered: Regex,
    scanner: DateScanner,
}

impl DecisionSections {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            decision: Regex::new(r"(?i)bursa\s+memutuskan\s+untuk\s*:\s*(?P<body>.*)$")?,
            items: Regex::new(r"(?:^|\s)a\.(?P<a>.*?)(?:\sb\.(?P<b>.*))?$")?,
            ticker: Regex::new(r"\(\s*([A-Z]{4})\s*\)")?,
            numbered: Regex::new(r"\b\d+\.\s+([A-Z]{3,4})\b")?,
            scanner: DateScanner::new()?,
        })
    }

    /// Tickers in document order, each at most once. Empty when the text
    /// names no codes in either layout.
    pub fn symbols(&self, normalized: &str) -> Vec<SectionedSymbol> {
        let decision = self
            .decision
            .captures(normalized)
            .and_then(|captures| captures.name("body"))
            .map_or(normalized, |body| body.as_str());

        let mut found: Vec<SectionedSymbol> = Vec::new();
        if let Some(items) = self.items.captures(decision) {
            let item_a = items.name("a").map_or("", |item| item.as_str());
            let date = self
                .scanner
                .first(item_a)
                .map_or(SectionDate::Document, |(date, _)| SectionDate::Stated(date));
            self.collect(&self.ticker, item_a, date, &mut found);

            if let Some(item_b) = items.name("b") {
                self.collect(&self.ticker, item_b.as_str(), SectionDate::Undated, &mut found);
            }
        }

        if found.is_empty() {
            self.collect(&self.numbered, normalized, SectionDate::Document, &mut found);
        }
        found
    }

    fn collect(&self, pattern: &Regex, text: &str, date: SectionDate, found: &mut Vec<SectionedSymbol>) {
        for captures in pattern.captures_iter(text) {
            let Some(symbol) = captures.get(1).map(|ticker| ticker.as_str()) else {
                continue;
            };
            if found.iter().any(|seen| seen.symbol == symbol) {
                continue;
            }
            found.push(SectionedSymbol {
                symbol: symbol.to_string(),
                date,
            });
        }
    }
}

/// Date token within a short distance after a suspension or date keyword.
/// Candidates whose span mentions the second trading session win; otherwise
/// the last candidate in the document does.
pub struct KeywordDateRule {
    keyword: Regex,
    scanner: DateScanner,
    max_distance: usize,
}

impl KeywordDateRule {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            keyword: Regex::new(r"(?i)suspensi|penghentian\s+sementara|\btanggal\b|\bdate\b")?,
            scanner: DateScanner::new()?,
            max_distance: 200,
        })
    }
}

fn floor_char_boundary(text: &str, mut index: usize) -> usize {
    index = index.min(text.len());
    while !text.is_char_boundary(index) {
        index -= 1;
    }
    index
}

impl FieldRule<(NaiveDate, DateSource)> for KeywordDateRule {
    fn name(&self) -> &'static str {
        "keyword-date"
    }

    fn apply(&self, input: &ParseInput<'_>) -> Option<(NaiveDate, DateSource)> {
        let text = input.normalized.as_str();
        let mut candidates: Vec<(NaiveDate, bool)> = Vec::new();

        for keyword in self.keyword.find_iter(text) {
            // Long enough for the longest date token starting at the limit.
            let window_end = floor_char_boundary(text, keyword.end() + self.max_distance + 24);
            let window = &text[keyword.end()..window_end];

            let Some((date, range)) = self.scanner.first(window) else {
                continue;
            };
            if range.start > self.max_distance {
                continue;
            }

            let snippet = &text[keyword.start()..keyword.end() + range.end];
            let mentions_session_two = snippet.to_lowercase().contains("sesi ii");
            candidates.push((date, mentions_session_two));
        }

        candidates
            .iter()
            .rev()
            .find(|(_, session_two)| *session_two)
            .or_else(|| candidates.last())
            .map(|(date, _)| (*date, DateSource::Text))
    }
}

/// Falls back to the date the announcement was published.
pub struct AnnouncementDateRule;

impl FieldRule<(NaiveDate, DateSource)> for AnnouncementDateRule {
    fn name(&self) -> &'static str {
        "announcement-date"
    }

    fn apply(&self, input: &ParseInput<'_>) -> Option<(NaiveDate, DateSource)> {
        Some((input.descriptor.announced_on, DateSource::Announcement))
    }
}

/// Block after an `Alasan:` / `Reason:` label, up to the next label or the
/// closing formula of the letter.
pub struct LabelledReasonRule {
    label: Regex,
    next_label: Regex,
    page_marker: Regex,
}

impl LabelledReasonRule {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            label: Regex::new(
                r"(?i)^\s*(?:alasan(?:\s+suspensi)?|reason(?:\s+for\s+suspension)?)\s*(?::\s*(?P<rest>.*))?$",
            )?,
            next_label: Regex::new(
                r"(?i)^\s*(?:(?:kode\s+saham|kode\s+efek|kode\s+perusahaan|stock\s+code|ticker|nama\s+perusahaan|company(?:\s+name)?|tanggal|date|perihal|subject|keterangan|alasan|reason)\s*(?::|$)|demikian\b|hormat\s+kami\b|atas\s+perhatian\b|ditetapkan\s+di\b)",
            )?,
            page_marker: Regex::new(
                r"(?i)^\s*(?:(?:halaman|page)\s+\d+(?:\s*(?:/|dari|of)\s*\d+)?|\d+\s*(?:/|dari|of)\s*\d+)\s*$",
            )?,
        })
    }
}

impl FieldRule<String> for LabelledReasonRule {
    fn name(&self) -> &'static str {
        "labelled-reason"
    }

    fn apply(&self, input: &ParseInput<'_>) -> Option<String> {
        let mut lines = input.text.lines();

        while let Some(line) = lines.next() {
            let Some(captures) = self.label.captures(line) else {
                continue;
            };

            let mut block: Vec<&str> = Vec::new();
            if let Some(rest) = captures.name("rest") {
                block.push(rest.as_str());
            }
            for line in lines.by_ref() {
                if self.next_label.is_match(line) {
                    break;
                }
                if !self.page_marker.is_match(line) {
                    block.push(line);
                }
            }

            let reason = block
                .join(" ")
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            if !reason.is_empty() {
                return Some(reason);
            }
        }

        None
    }
}

/// The publisher's recurrent suspension grounds, matched by phrase and
/// mapped to a canonical sentence. `{symbol}` is replaced by the ticker.
const REASON_CATALOGUE: &[(&str, &str)] = &[
    (
        "peningkatan harga kumulatif yang signifikan",
        "Terjadinya peningkatan harga kumulatif yang signifikan pada saham {symbol}",
    ),
    (
        "cooling down sebagai bentuk perlindungan bagi investor",
        "Dalam rangka cooling down sebagai bentuk perlindungan bagi investor",
    ),
    (
        "untuk melakukan pembubaran dan likuidasi",
        "Berencana untuk melakukan pembubaran dan likuidasi {symbol}",
    ),
    (
        "penurunan harga kumulatif yang signifikan",
        "Terjadinya penurunan harga kumulatif yang signifikan pada saham {symbol}",
    ),
    (
        "belum menyampaikan laporan keuangan auditan tahunan",
        "Belum menyampaikan laporan keuangan auditan tahunan",
    ),
    (
        "berada dalam papan pemantauan khusus selama lebih dari 1 (satu) tahun berturut-turut",
        "Efek Perseroan telah berada dalam papan pemantauan khusus selama lebih dari 1 (satu) tahun berturut-turut",
    ),
    (
        "pengalihan saham hasil pelaksanaan pembelian kembali saham",
        "Dalam rangka pengalihan saham hasil pelaksanaan pembelian kembali saham (buyback) dalam rangka delisting perseroan",
    ),
    (
        "belum menyampaikan laporan keuangan interim",
        "Belum menyampaikan laporan keuangan interim dan/atau belum melakukan pembayaran denda atas keterlambatan penyampaian laporan keuangan tersebut",
    ),
    (
        "belum memenuhi ketentuan v.1.1.",
        "Belum memenuhi ketentuan V.1.1. dan/atau V.1.2. peraturan bursa nomor I-A",
    ),
    (
        "keterlambatan pembayaran biaya pencatatan tahunan",
        "Keterlambatan pembayaran biaya pencatatan tahunan",
    ),
    (
        "terdapat keraguan atas kelangsungan usaha perseroan",
        "Bursa menilai bahwa terdapat keraguan atas kelangsungan usaha perseroan",
    ),
];

const PRICE_INCREASE: &str = "peningkatan harga kumulatif yang signifikan";
const COOLING_DOWN: &str = "cooling down sebagai bentuk perlindungan bagi investor";

pub struct ReasonCatalogueRule;

fn fill_symbol(template: &str, symbol: Option<&str>) -> String {
    match symbol {
        Some(symbol) => template.replace("{symbol}", symbol),
        None => template.replace(" {symbol}", "").replace("{symbol}", ""),
    }
}

impl FieldRule<String> for ReasonCatalogueRule {
    fn name(&self) -> &'static str {
        "reason-catalogue"
    }

    fn apply(&self, input: &ParseInput<'_>) -> Option<String> {
        let lowered = input.normalized.to_lowercase();
        let symbol = input.symbol.as_deref();

        if lowered.contains(PRICE_INCREASE) && lowered.contains(COOLING_DOWN) {
            return Some(fill_symbol(
                "Terjadinya peningkatan harga kumulatif yang signifikan pada saham {symbol}, dalam rangka cooling down sebagai bentuk perlindungan bagi investor",
                symbol,
            ));
        }

        REASON_CATALOGUE
            .iter()
            .find(|(phrase, _)| lowered.contains(phrase))
            .map(|(_, template)| fill_symbol(template, symbol))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnnouncementDescriptor;

    fn descriptor() -> AnnouncementDescriptor {
        AnnouncementDescriptor::new(
            "https://idx.test/a.pdf",
            NaiveDate::from_ymd_opt(2024, 1, 10).expect("valid date"),
        )
    }

    #[test]
    fn ticker_on_the_line_after_the_label() {
        let descriptor = descriptor();
        let input = ParseInput::new("Kode Saham\n\n  WXYZ  \nNama", &descriptor);
        let rule = LabelledTickerRule::new().expect("patterns compile");
        assert_eq!(rule.apply(&input).as_deref(), Some("WXYZ"));
    }

    #[test]
    fn label_without_ticker_yields_nothing() {
        let descriptor = descriptor();
        let input = ParseInput::new("Kode Saham :\nperusahaan tercatat", &descriptor);
        let rule = LabelledTickerRule::new().expect("patterns compile");
        assert_eq!(rule.apply(&input), None);
    }

    #[test]
    fn listed_code_must_look_like_a_ticker() {
        let mut descriptor = descriptor();
        descriptor.listed_code = Some("abcd".to_string());
        let input = ParseInput::new("", &descriptor);
        assert_eq!(ListedCodeRule.apply(&input).as_deref(), Some("ABCD"));

        descriptor.listed_code = Some(">1 kode".to_string());
        let input = ParseInput::new("", &descriptor);
        assert_eq!(ListedCodeRule.apply(&input), None);
    }

    #[test]
    fn listed_code_is_ignored_on_multi_company_letters() {
        let mut descriptor = descriptor();
        descriptor.listed_code = Some("ABCD".to_string());
        descriptor.title = Some("Suspensi Efek (>1 kode)".to_string());
        let input = ParseInput::new("", &descriptor);
        assert_eq!(ListedCodeRule.apply(&input), None);
    }

    #[test]
    fn decision_items_split_dated_and_continuing_codes() {
        let sections = DecisionSections::new().expect("patterns compile");
        let text = "Menimbang hal tersebut (KSEI) terkait. Atas dasar hal tersebut di atas, Bursa memutuskan untuk: \
                    a. Menghentikan sementara perdagangan PT Abcd Tbk. (ABCD) dan PT Efgh Tbk. (EFGH) \
                    pada tanggal 15 Januari 2024; b. Melanjutkan penghentian PT Ijkl Tbk. (IJKL) serta (ABCD).";

        let found = sections.symbols(text);

        let stated = SectionDate::Stated(NaiveDate::from_ymd_opt(2024, 1, 15).expect("valid date"));
        assert_eq!(
            found,
            vec![
                SectionedSymbol { symbol: "ABCD".to_string(), date: stated },
                SectionedSymbol { symbol: "EFGH".to_string(), date: stated },
                SectionedSymbol { symbol: "IJKL".to_string(), date: SectionDate::Undated },
            ]
        );
    }

    #[test]
    fn numbered_codes_are_used_without_lettered_items() {
        let sections = DecisionSections::new().expect("patterns compile");
        let found = sections.symbols("Daftar efek yang dihentikan: 1. ABCD 2. EFG 3. ABCD");

        let symbols: Vec<&str> = found.iter().map(|entry| entry.symbol.as_str()).collect();
        assert_eq!(symbols, vec!["ABCD", "EFG"]);
        assert!(found.iter().all(|entry| entry.date == SectionDate::Document));
    }

    #[test]
    fn letters_without_codes_yield_nothing() {
        let sections = DecisionSections::new().expect("patterns compile");
        assert!(sections.symbols("Bursa memutuskan untuk: menunda pengumuman").is_empty());
    }

    #[test]
    fn date_far_from_any_keyword_is_ignored() {
        let descriptor = descriptor();
        let filler = "lorem ".repeat(60);
        let text = format!("suspensi {filler} 15 Januari 2024");
        let input = ParseInput::new(&text, &descriptor);
        let rule = KeywordDateRule::new().expect("patterns compile");
        assert_eq!(rule.apply(&input), None);
    }

    #[test]
    fn reason_block_stops_at_closing_formula_and_drops_page_markers() {
        let descriptor = descriptor();
        let text = "Alasan Suspensi:\nBelum menyampaikan laporan\nHalaman 1 dari 2\nkeuangan tahunan.\nDemikian untuk diketahui.\nHormat kami";
        let input = ParseInput::new(text, &descriptor);
        let rule = LabelledReasonRule::new().expect("patterns compile");
        assert_eq!(
            rule.apply(&input).as_deref(),
            Some("Belum menyampaikan laporan keuangan tahunan.")
        );
    }

    #[test]
    fn prose_starting_with_alasan_is_not_a_label() {
        let descriptor = descriptor();
        let input = ParseInput::new("Alasan penghentian dijelaskan di bawah", &descriptor);
        let rule = LabelledReasonRule::new().expect("patterns compile");
        assert_eq!(rule.apply(&input), None);
    }

    #[test]
    fn catalogue_without_symbol_drops_the_placeholder() {
        let descriptor = descriptor();
        let input = ParseInput::new(
            "terjadi penurunan harga kumulatif yang signifikan",
            &descriptor,
        );
        assert_eq!(
            ReasonCatalogueRule.apply(&input).as_deref(),
            Some("Terjadinya penurunan harga kumulatif yang signifikan pada saham")
        );
    }
}
