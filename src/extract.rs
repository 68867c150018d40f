//! Turns one detail page into a [`Record`].
//!
//! Detail pages are loosely structured narrative: labeled values ("Case:",
//! "Date:", "Deceased 2:", "DOB:") appear in paragraphs, line breaks, table
//! cells or a single run-on line. The page is flattened to text blocks, every
//! label occurrence is located, and each label's value runs until the next
//! label. Victim clusters are formed from "Deceased"/"Name" labels and the
//! demographic labels that follow them.

use std::sync::LazyLock;

use chrono::{Datelike as _, NaiveDate};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use thiserror::Error;

use crate::dates;
use crate::model::{DobCheck, Gender, Record, Victim};

pub const MAX_PLAUSIBLE_AGE: u32 = 130;

const FOOTER: &str = "Fatality information may change.";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExtractionError {
    #[error("no structured field could be recovered from the page")]
    NoContent,
}

static LABEL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)(?:^|[\s|;,(])(?P<label>case(?:\s+(?:number|no\.?|#))?|date\s+of\s+birth|d\.o\.b\.?|dob|date\s+of\s+(?:crash|incident|collision)|crash\s+date|date|time|location|address|deceased|victim|name|age|gender|sex|ethnicity|race|latitude|longitude|lat|lng|lon|long|coordinates|number\s+of\s+fatalities|fatalities)(?:\s*#?\s*\d{1,2})?\s*:",
    )
    .expect("label regex")
});

static CASE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{2}-\d{3,7})\b").expect("case regex"));

static CRASH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)traffic\s+fatality\s*#\s*(\d{1,3})\b").expect("crash number regex")
});

static DOB_MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\(?\b(?:d\.o\.b\.?|(?:dob|date\s+of\s+birth|born)\b)(?:\s*[:.])?\s*")
        .expect("dob marker regex")
});

static UNIDENTIFIED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:unidentified|unknown),?\s+(?:[a-z]+\s+)?(?:female|male)\b")
        .expect("unidentified victim regex")
});

static BARE_DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b\d{1,2}[/-]\d{1,2}[/-](?:\d{4}|\d{2})\b").expect("bare date regex")
});

static AGE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:age\s+(?P<prefixed>\d{1,3})|(?P<suffixed>\d{1,3})\s*(?:-\s*)?(?:years?|yrs?)(?:\s*-?\s*old|\s+of\s+age)?)\b",
    )
    .expect("age regex")
});

static INTEGER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d[\d,]*").expect("integer regex"));

static DECIMAL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"-?\d{1,3}(?:[.,]\d+)?").expect("decimal regex"));

static META_SELECTOR: LazyLock<Selector> = LazyLock::new(|| {
    Selector::parse(
        r#"meta[name="twitter:description"], meta[property="og:description"], meta[name="description"]"#,
    )
    .expect("meta selector")
});

const SKIPPED_TAGS: &[&str] = &["script", "style", "head", "noscript", "template"];

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "br", "dd", "div", "dl", "dt", "footer",
    "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr", "li", "main", "nav", "ol", "p", "pre",
    "section", "table", "td", "th", "tr", "ul",
];

const GENERATIONS: &[&str] = &["jr", "jr.", "sr", "sr.", "ii", "iii", "iv"];

const NAME_PLACEHOLDERS: &[&str] = &[
    "unidentified",
    "unknown",
    "withheld",
    "pending",
    "not released",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Case,
    Date,
    Time,
    Location,
    Victim,
    Dob,
    Age,
    Gender,
    Ethnicity,
    Latitude,
    Longitude,
    Coordinates,
    Fatalities,
}

impl Field {
    fn from_label(label: &str) -> Option<Self> {
        let normalized = label
            .to_ascii_lowercase()
            .replace(['.', '#'], "")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        let field = match normalized.as_str() {
            "date of birth" | "dob" => Field::Dob,
            "date" | "crash date" => Field::Date,
            s if s.starts_with("date of") => Field::Date,
            s if s.starts_with("case") => Field::Case,
            "time" => Field::Time,
            "location" | "address" => Field::Location,
            "deceased" | "victim" | "name" => Field::Victim,
            "age" => Field::Age,
            "gender" | "sex" => Field::Gender,
            "ethnicity" | "race" => Field::Ethnicity,
            "latitude" | "lat" => Field::Latitude,
            "longitude" | "long" | "lng" | "lon" => Field::Longitude,
            "coordinates" => Field::Coordinates,
            "fatalities" | "number of fatalities" => Field::Fatalities,
            _ => return None,
        };
        Some(field)
    }
}

/// The readable text of a page, one entry per block-level element.
#[derive(Debug, Clone, Default)]
pub struct PageText {
    pub blocks: Vec<String>,
    pub meta_description: Option<String>,
}

impl PageText {
    pub fn parse(html: &str) -> Self {
        let document = Html::parse_document(html);

        let mut raw = String::new();
        push_text(document.root_element(), &mut raw);
        let blocks = raw
            .split('\n')
            .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
            .filter(|line| !line.is_empty())
            .collect();

        let meta_description = document
            .select(&META_SELECTOR)
            .filter_map(|meta| meta.value().attr("content"))
            .map(|content| content.split_whitespace().collect::<Vec<_>>().join(" "))
            .find(|content| !content.is_empty());

        Self {
            blocks,
            meta_description,
        }
    }
}

fn push_text(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    if SKIPPED_TAGS.contains(&name) {
        return;
    }
    let block = BLOCK_TAGS.contains(&name);
    if block {
        out.push('\n');
    }
    for child in element.children() {
        if let Some(child_element) = ElementRef::wrap(child) {
            push_text(child_element, out);
        } else if let Some(text) = child.value().as_text() {
            out.push_str(text);
        }
    }
    if block {
        out.push('\n');
    }
}

#[derive(Debug, Default)]
struct VictimDraft {
    name: Option<String>,
    dob: Option<String>,
    age: Option<String>,
    gender: Option<String>,
    ethnicity: Option<String>,
}

impl VictimDraft {
    fn is_blank(&self) -> bool {
        self.name.is_none()
            && self.dob.is_none()
            && self.age.is_none()
            && self.gender.is_none()
            && self.ethnicity.is_none()
    }

    fn slot(&mut self, field: Field) -> Option<&mut Option<String>> {
        match field {
            Field::Dob => Some(&mut self.dob),
            Field::Age => Some(&mut self.age),
            Field::Gender => Some(&mut self.gender),
            Field::Ethnicity => Some(&mut self.ethnicity),
            _ => None,
        }
    }
}

#[derive(Debug, Default)]
struct Collected {
    case: Option<String>,
    date: Option<String>,
    time: Option<String>,
    location: Option<String>,
    latitude: Option<String>,
    longitude: Option<String>,
    coordinates: Option<String>,
    fatalities: Option<String>,
    victims: Vec<VictimDraft>,
    notes: Vec<String>,
}

impl Collected {
    fn from_blocks<S: AsRef<str>>(blocks: &[S]) -> Self {
        let mut collected = Collected::default();
        let mut seen_label = false;
        let mut idx = 0;

        while idx < blocks.len() {
            let block = blocks[idx].as_ref();
            idx += 1;

            let labels = LABEL_RE
                .captures_iter(block)
                .filter_map(|caps| {
                    let whole = caps.get(0)?;
                    let field = Field::from_label(caps.name("label")?.as_str())?;
                    Some((field, whole.start(), whole.end()))
                })
                .collect::<Vec<_>>();

            if labels.is_empty() {
                if seen_label {
                    collected.notes.push(block.to_owned());
                }
                continue;
            }
            seen_label = true;

            for (i, &(field, _, value_start)) in labels.iter().enumerate() {
                let value_end = labels.get(i + 1).map_or(block.len(), |next| next.1);
                let mut value = block[value_start..value_end].trim().to_owned();

                // "<strong>Case:</strong><br>19-123" puts the value in its own block.
                if value.is_empty()
                    && i + 1 == labels.len()
                    && let Some(next) = blocks.get(idx)
                    && !LABEL_RE.is_match(next.as_ref())
                {
                    value = next.as_ref().trim().to_owned();
                    idx += 1;
                }

                collected.push(field, value);
            }
        }

        collected
    }

    fn push(&mut self, field: Field, value: String) {
        let keep_first = |slot: &mut Option<String>, value: String| {
            if slot.is_none() && !dates::is_placeholder(&value) {
                *slot = Some(value);
            }
        };

        match field {
            Field::Case => keep_first(&mut self.case, value),
            Field::Date => keep_first(&mut self.date, value),
            Field::Time => keep_first(&mut self.time, value),
            Field::Location => keep_first(&mut self.location, value),
            Field::Latitude => keep_first(&mut self.latitude, value),
            Field::Longitude => keep_first(&mut self.longitude, value),
            Field::Coordinates => keep_first(&mut self.coordinates, value),
            Field::Fatalities => keep_first(&mut self.fatalities, value),
            Field::Victim => {
                for (i, piece) in split_victims(&value).into_iter().enumerate() {
                    let draft = parse_victim_text(piece);
                    match self.victims.last_mut() {
                        Some(last) if i == 0 && last.is_blank() => *last = draft,
                        _ => self.victims.push(draft),
                    }
                }
            }
            Field::Dob | Field::Age | Field::Gender | Field::Ethnicity => {
                if dates::is_placeholder(&value) {
                    return;
                }
                let needs_new = match self.victims.last_mut() {
                    Some(last) => last.slot(field).is_none_or(|slot| slot.is_some()),
                    None => true,
                };
                if needs_new {
                    self.victims.push(VictimDraft::default());
                }
                if let Some(slot) = self.victims.last_mut().and_then(|last| last.slot(field)) {
                    *slot = Some(value);
                }
            }
        }
    }
}

/// Splits one "Deceased:" value naming several people into a piece per
/// person, in source order. Two signals mark a new person: another full date
/// (each person's text ends with their date of birth), or another
/// "Unidentified <ethnicity> male/female" phrase.
fn split_victims(value: &str) -> Vec<&str> {
    let unidentified = UNIDENTIFIED_RE
        .find_iter(value)
        .map(|found| found.start())
        .collect::<Vec<_>>();
    let cuts = if unidentified.len() > 1 {
        unidentified[1..].to_vec()
    } else {
        let spans = dates::full_date_spans(value);
        spans
            .iter()
            .take(spans.len().saturating_sub(1))
            .map(|span| span.end)
            .collect()
    };
    if cuts.is_empty() {
        return vec![value];
    }

    let mut pieces = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for cut in cuts.into_iter().chain([value.len()]) {
        let piece = trim_connectors(&value[start..cut]);
        if !piece.is_empty() {
            pieces.push(piece);
        }
        start = cut;
    }
    pieces
}

fn trim_connectors(piece: &str) -> &str {
    let is_separator = |c: char| c.is_whitespace() || matches!(c, ',' | ';' | '|' | '&');
    let mut piece = piece.trim_matches(is_separator);
    if let Some(rest) = piece
        .strip_prefix("and")
        .filter(|rest| rest.starts_with(char::is_whitespace))
    {
        piece = rest.trim_matches(is_separator);
    }
    if let Some(rest) = piece
        .strip_suffix("and")
        .filter(|rest| rest.ends_with(char::is_whitespace))
    {
        piece = rest.trim_matches(is_separator);
    }
    piece
}

/// Splits a "Deceased:" style value into its name and demographic pieces.
///
/// Handles comma-, pipe- and space-delimited layouts such as
/// "John Smith, White male, DOB 02/09/80", "Maria Lopez | H/F | 45 years of age"
/// and "Jose Vasquez Hispanic male".
fn parse_victim_text(value: &str) -> VictimDraft {
    let mut draft = VictimDraft::default();
    let mut rest = value.trim().to_owned();

    if let Some(marker) = DOB_MARKER_RE.find(&rest) {
        let after = &rest[marker.end()..];
        // The date ends the DOB value; "DOB 02/09/80, White male" keeps its descriptors.
        let dob_end = dates::first_date_span(after)
            .map(|span| span.end)
            .or_else(|| after.find([',', '|', ';']))
            .unwrap_or(after.len());
        let dob = after[..dob_end].trim().to_owned();
        let tail = after[dob_end..].to_owned();
        if !dob.is_empty() {
            draft.dob = Some(dob);
        }
        rest.truncate(marker.start());
        rest.push_str(", ");
        rest.push_str(&tail);
    } else if let Some(bare) = BARE_DATE_RE.find(&rest) {
        draft.dob = Some(bare.as_str().to_owned());
        rest.replace_range(bare.range(), "");
    }

    if let Some(caps) = AGE_RE.captures(&rest) {
        let digits = caps.name("prefixed").or_else(|| caps.name("suffixed"));
        if let (Some(digits), Some(whole)) = (digits, caps.get(0)) {
            draft.age = Some(digits.as_str().to_owned());
            let range = whole.range();
            rest.replace_range(range, "");
        }
    }

    let parts = rest
        .split([',', '|', ';'])
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>();
    let Some((name_part, descriptor_parts)) = parts.split_first() else {
        return draft;
    };

    let mut name_words = name_part.split_whitespace().collect::<Vec<_>>();
    let mut descriptors = Vec::new();
    if descriptor_parts.is_empty() {
        while name_words.len() > 2
            && let Some(last) = name_words.last()
            && is_descriptor_word(last)
        {
            descriptors.extend(name_words.pop());
        }
    }
    descriptors.extend(
        descriptor_parts
            .iter()
            .flat_map(|part| part.split(|c: char| c.is_whitespace() || c == '/')),
    );

    let name = name_words.join(" ");
    let lowered = name.to_ascii_lowercase();
    if let Some(placeholder) = NAME_PLACEHOLDERS.iter().find(|p| lowered.starts_with(*p)) {
        // "Unidentified male": the words after the placeholder describe the person.
        let skip = placeholder.split_whitespace().count();
        descriptors.extend(name_words.iter().skip(skip).copied());
    } else if name.chars().any(char::is_alphabetic) {
        draft.name = Some(name);
    }

    for token in descriptors {
        if gender_from_text(token) != Gender::Unknown {
            draft.gender.get_or_insert_with(|| token.to_owned());
        } else if ethnicity_from_text(token).is_some() {
            draft.ethnicity.get_or_insert_with(|| token.to_owned());
        }
    }

    draft
}

fn is_descriptor_word(word: &str) -> bool {
    word.len() > 1
        && (gender_from_text(word) != Gender::Unknown || ethnicity_from_text(word).is_some())
}

fn gender_from_text(text: &str) -> Gender {
    let cleaned = text
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_ascii_lowercase();
    match cleaned.as_str() {
        "m" | "male" | "man" | "boy" => Gender::Male,
        "f" | "female" | "woman" | "girl" => Gender::Female,
        _ => Gender::Unknown,
    }
}

fn ethnicity_from_text(text: &str) -> Option<String> {
    let cleaned = text
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_ascii_lowercase();
    let known = match cleaned.as_str() {
        "w" | "white" => "White",
        "b" | "black" | "african american" => "Black",
        "h" | "hispanic" | "latino" | "latina" => "Hispanic",
        "a" | "asian" => "Asian",
        "o" | "other" => "Other",
        _ => return None,
    };
    Some(known.to_owned())
}

#[derive(Debug, Clone, Default)]
struct Name {
    first: Option<String>,
    middle: Option<String>,
    last: Option<String>,
    generation: Option<String>,
}

fn parse_name(full: &str) -> Name {
    let mut words = full
        .split_whitespace()
        .map(|word| word.trim_matches(','))
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>();

    let mut name = Name::default();
    if let Some(pos) = words
        .iter()
        .position(|word| GENERATIONS.contains(&word.to_ascii_lowercase().as_str()))
    {
        name.generation = Some(words.remove(pos).to_owned());
    }
    if words.is_empty() {
        return name;
    }
    name.first = Some(words.remove(0).to_owned());
    if let Some(last) = words.pop() {
        name.last = Some(last.to_owned());
    }
    if !words.is_empty() {
        name.middle = Some(words.join(" "));
    }
    name
}

/// Extracts structured records from detail pages.
#[derive(Debug, Clone)]
pub struct RecordExtractor {
    reference_date: NaiveDate,
}

impl RecordExtractor {
    /// `reference_date` resolves two-digit years when the incident date itself
    /// is unknown.
    pub fn new(reference_date: NaiveDate) -> Self {
        Self { reference_date }
    }

    pub fn extract(&self, page: &str) -> Result<Record, ExtractionError> {
        let text = PageText::parse(page);
        let mut record = self.assemble(Collected::from_blocks(&text.blocks));

        if record.crash_number.is_none() {
            record.crash_number = text
                .blocks
                .iter()
                .find_map(|block| CRASH_RE.captures(block))
                .and_then(|caps| caps[1].parse().ok());
        }

        if let Some(meta) = text.meta_description.as_deref() {
            let fallback = self.assemble(Collected::from_blocks(&[meta]));
            merge_missing(&mut record, fallback);
        }

        if !has_structured_content(&record) {
            return Err(ExtractionError::NoContent);
        }
        Ok(record)
    }

    fn assemble(&self, collected: Collected) -> Record {
        let mut record = Record::default();
        let reference_year = self.reference_date.year();

        record.case_number = collected.case.as_deref().and_then(parse_case_number);

        if let Some(raw) = collected.date.as_deref() {
            record.date = match dates::parse_date(raw, reference_year) {
                Ok(date) => date,
                Err(err) => dates::search_date(raw, reference_year).or_else(|| {
                    note(&mut record.quality_notes, format!("incident date dropped: {err}"));
                    None
                }),
            };
        }

        if let Some(raw) = collected.time.as_deref() {
            record.time = match dates::parse_time(raw) {
                Ok(time) => time,
                Err(err) => dates::search_time(raw).or_else(|| {
                    note(&mut record.quality_notes, format!("incident time dropped: {err}"));
                    None
                }),
            };
        }

        record.location = collected.location.map(|location| {
            location
                .trim_end_matches(|c: char| c == ',' || c == ';')
                .to_owned()
        });

        if let Some(raw) = collected.coordinates.as_deref() {
            let mut values = DECIMAL_RE.find_iter(raw).map(|m| m.as_str());
            record.latitude = values
                .next()
                .and_then(|v| coordinate(v, 90.0, "latitude", &mut record.quality_notes));
            record.longitude = values
                .next()
                .and_then(|v| coordinate(v, 180.0, "longitude", &mut record.quality_notes));
        }
        if let Some(raw) = collected.latitude.as_deref() {
            record.latitude = coordinate(raw, 90.0, "latitude", &mut record.quality_notes);
        }
        if let Some(raw) = collected.longitude.as_deref() {
            record.longitude = coordinate(raw, 180.0, "longitude", &mut record.quality_notes);
        }

        for draft in collected.victims {
            let victim = self.finish_victim(draft, record.date, &mut record.quality_notes);
            record.victims.push(victim);
        }

        let explicit_count = collected
            .fatalities
            .as_deref()
            .and_then(|raw| parse_count(raw, "fatality count", &mut record.quality_notes));
        record.fatality_count = explicit_count
            .unwrap_or_else(|| u32::try_from(record.victims.len()).unwrap_or(u32::MAX).max(1));

        record.notes = notes_from_blocks(&collected.notes);
        record
    }

    fn finish_victim(
        &self,
        draft: VictimDraft,
        incident_date: Option<NaiveDate>,
        quality_notes: &mut Vec<String>,
    ) -> Victim {
        let name = draft.name.as_deref().map(parse_name).unwrap_or_default();
        let mut victim = Victim {
            first_name: name.first,
            middle_name: name.middle,
            last_name: name.last,
            generation: name.generation,
            gender: draft.gender.as_deref().map_or(Gender::Unknown, gender_from_text),
            ethnicity: draft.ethnicity.as_deref().and_then(|raw| {
                ethnicity_from_text(raw).or_else(|| {
                    let trimmed = raw.trim().trim_end_matches(',');
                    (!trimmed.is_empty()).then(|| trimmed.to_owned())
                })
            }),
            ..Victim::default()
        };

        let reference_year = incident_date.unwrap_or(self.reference_date).year();
        if let Some(raw) = draft.dob.as_deref() {
            let parsed = match dates::parse_date(raw, reference_year) {
                Ok(dob) => dob,
                Err(err) => dates::search_date(raw, reference_year).or_else(|| {
                    note(quality_notes, format!("date of birth dropped: {err}"));
                    None
                }),
            };
            victim.date_of_birth = match (parsed, incident_date) {
                (Some(dob), Some(date)) if dob > date => {
                    note(
                        quality_notes,
                        format!("date of birth {dob} is after the incident date {date}"),
                    );
                    None
                }
                (parsed, _) => parsed,
            };
        }

        victim.age = draft
            .age
            .as_deref()
            .and_then(|raw| parse_count(raw, "age", quality_notes))
            .and_then(|age| {
                if age > MAX_PLAUSIBLE_AGE {
                    note(quality_notes, format!("age {age} is not plausible"));
                    None
                } else {
                    Some(age)
                }
            });

        if let (Some(dob), Some(date)) = (victim.date_of_birth, incident_date) {
            match victim.age {
                Some(age) => {
                    let check = dates::check_dob(dob, date, age);
                    if let DobCheck::Inconsistent { delta } = check {
                        note(
                            quality_notes,
                            format!("stated age {age} disagrees with date of birth {dob} by {delta} years"),
                        );
                    }
                    victim.dob_check = Some(check);
                }
                None => victim.age = dates::compute_age(dob, date).ok(),
            }
        }

        victim
    }
}

fn note(notes: &mut Vec<String>, message: String) {
    tracing::debug!(note = %message, "data quality");
    notes.push(message);
}

fn parse_case_number(raw: &str) -> Option<String> {
    if let Some(caps) = CASE_RE.captures(raw) {
        return Some(caps[1].to_owned());
    }
    let token = raw
        .split_whitespace()
        .next()?
        .trim_matches(|c: char| !c.is_alphanumeric());
    token
        .chars()
        .any(|c| c.is_ascii_digit())
        .then(|| token.to_owned())
}

/// Parses a non-negative integer, accepting thousands separators.
fn parse_count(raw: &str, what: &str, quality_notes: &mut Vec<String>) -> Option<u32> {
    let found = INTEGER_RE.find(raw)?.as_str();
    let digits = found.replace(',', "");
    match digits.parse::<i64>() {
        Ok(value) if value < 0 => {
            note(quality_notes, format!("{what} {value} is negative"));
            None
        }
        Ok(value) => u32::try_from(value).ok(),
        Err(_) => {
            note(quality_notes, format!("{what} {found:?} is not a number"));
            None
        }
    }
}

fn coordinate(raw: &str, limit: f64, what: &str, quality_notes: &mut Vec<String>) -> Option<f64> {
    let found = DECIMAL_RE.find(raw)?.as_str().replace(',', ".");
    match found.parse::<f64>() {
        Ok(value) if value.abs() <= limit => Some(value),
        Ok(value) => {
            note(quality_notes, format!("{what} {value} is out of range"));
            None
        }
        Err(_) => None,
    }
}

fn notes_from_blocks(blocks: &[String]) -> Option<String> {
    let joined = blocks.join(" ");
    let notes = match joined.find(FOOTER) {
        Some(pos) => &joined[..pos + FOOTER.len()],
        None => joined.as_str(),
    };
    let notes = notes.trim();
    (!notes.is_empty()).then(|| notes.to_owned())
}

fn merge_missing(record: &mut Record, fallback: Record) {
    let before = record.clone();
    record.case_number = record.case_number.take().or(fallback.case_number);
    record.date = record.date.or(fallback.date);
    record.time = record.time.or(fallback.time);
    record.location = record.location.take().or(fallback.location);
    record.latitude = record.latitude.or(fallback.latitude);
    record.longitude = record.longitude.or(fallback.longitude);
    if record.victims.is_empty() && !fallback.victims.is_empty() {
        record.victims = fallback.victims;
        record.fatality_count = fallback.fatality_count;
    }
    if record.notes.is_none() {
        record.notes = fallback.notes;
    }
    if *record != before {
        record.quality_notes.extend(fallback.quality_notes);
    }
}

fn has_structured_content(record: &Record) -> bool {
    record.case_number.is_some()
        || record.crash_number.is_some()
        || record.date.is_some()
        || record.time.is_some()
        || record.location.is_some()
        || record.latitude.is_some()
        || record.longitude.is_some()
        || !record.victims.is_empty()
}
