use std::io::{self, Write};

use chrono::{NaiveDate, NaiveTime};

use crate::model::{DobCheck, Gender, Record, Victim};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Json,
    Csv,
    Plain,
    Count,
}

pub trait Renderer {
    fn render(&self, records: &[Record], out: &mut dyn Write) -> io::Result<()>;
}

pub fn renderer_for(format: OutputFormat) -> Box<dyn Renderer> {
    match format {
        OutputFormat::Json => Box::new(JsonRenderer),
        OutputFormat::Csv => Box::new(CsvRenderer),
        OutputFormat::Plain => Box::new(PlainRenderer),
        OutputFormat::Count => Box::new(CountRenderer),
    }
}

pub struct JsonRenderer;

impl Renderer for JsonRenderer {
    fn render(&self, records: &[Record], out: &mut dyn Write) -> io::Result<()> {
        serde_json::to_writer_pretty(&mut *out, records)?;
        writeln!(out)
    }
}

const CSV_HEADER: &[&str] = &[
    "case_number",
    "crash_number",
    "date",
    "time",
    "location",
    "latitude",
    "longitude",
    "fatality_count",
    "first_name",
    "middle_name",
    "last_name",
    "generation",
    "age",
    "date_of_birth",
    "gender",
    "ethnicity",
    "dob_check",
    "notes",
    "link",
];

/// One row per victim; a record without victims still gets one row.
pub struct CsvRenderer;

impl Renderer for CsvRenderer {
    fn render(&self, records: &[Record], out: &mut dyn Write) -> io::Result<()> {
        write_row(out, CSV_HEADER.iter().copied())?;
        let blank = Victim::default();
        for record in records {
            let victims = if record.victims.is_empty() {
                std::slice::from_ref(&blank)
            } else {
                record.victims.as_slice()
            };
            for victim in victims {
                let row = csv_row(record, victim);
                write_row(out, row.iter().map(String::as_str))?;
            }
        }
        Ok(())
    }
}

fn csv_row(record: &Record, victim: &Victim) -> Vec<String> {
    let has_victim = !victim.is_empty();
    vec![
        opt(record.case_number.as_deref()),
        opt(record.crash_number),
        opt(record.date.map(format_date)),
        opt(record.time.map(format_time)),
        opt(record.location.as_deref()),
        opt(record.latitude),
        opt(record.longitude),
        record.fatality_count.to_string(),
        opt(victim.first_name.as_deref()),
        opt(victim.middle_name.as_deref()),
        opt(victim.last_name.as_deref()),
        opt(victim.generation.as_deref()),
        opt(victim.age),
        opt(victim.date_of_birth.map(format_date)),
        if has_victim {
            victim.gender.as_str().to_string()
        } else {
            String::new()
        },
        opt(victim.ethnicity.as_deref()),
        opt(victim.dob_check.map(describe_dob_check)),
        opt(record.notes.as_deref()),
        opt(record.link.as_deref()),
    ]
}

fn opt<T: ToString>(value: Option<T>) -> String {
    value.map(|value| value.to_string()).unwrap_or_default()
}

fn write_row<'a>(out: &mut dyn Write, cells: impl Iterator<Item = &'a str>) -> io::Result<()> {
    for (idx, cell) in cells.enumerate() {
        if idx > 0 {
            out.write_all(b",")?;
        }
        if cell.contains([',', '"', '\n', '\r']) {
            write!(out, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            out.write_all(cell.as_bytes())?;
        }
    }
    out.write_all(b"\r\n")
}

pub struct PlainRenderer;

impl Renderer for PlainRenderer {
    fn render(&self, records: &[Record], out: &mut dyn Write) -> io::Result<()> {
        for (idx, record) in records.iter().enumerate() {
            if idx > 0 {
                writeln!(out)?;
            }
            let heading = match (record.case_number.as_deref(), record.crash_number) {
                (Some(case), Some(crash)) => format!("Case {case} (Traffic Fatality #{crash})"),
                (Some(case), None) => format!("Case {case}"),
                (None, Some(crash)) => format!("Traffic Fatality #{crash}"),
                (None, None) => "Unnumbered case".to_string(),
            };
            writeln!(out, "{heading}")?;

            let when = [
                record.date.map(format_date),
                record.time.map(format_time),
            ]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
            if !when.is_empty() {
                writeln!(out, "  When:       {when}")?;
            }
            if let Some(location) = &record.location {
                writeln!(out, "  Location:   {location}")?;
            }
            if let (Some(lat), Some(lon)) = (record.latitude, record.longitude) {
                writeln!(out, "  Coordinates: {lat}, {lon}")?;
            }
            if record.fatality_count != 1 {
                writeln!(out, "  Fatalities: {}", record.fatality_count)?;
            }
            for victim in &record.victims {
                writeln!(out, "  Deceased:   {}", describe_victim(victim))?;
            }
            if let Some(link) = &record.link {
                writeln!(out, "  Link:       {link}")?;
            }
            for note in &record.quality_notes {
                writeln!(out, "  ! {note}")?;
            }
        }
        Ok(())
    }
}

fn describe_victim(victim: &Victim) -> String {
    let mut parts = vec![victim.full_name().unwrap_or_else(|| "unidentified".to_string())];
    if victim.gender != Gender::Unknown {
        parts.push(victim.gender.as_str().to_string());
    }
    if let Some(ethnicity) = &victim.ethnicity {
        parts.push(ethnicity.clone());
    }
    if let Some(age) = victim.age {
        parts.push(format!("age {age}"));
    }
    if let Some(dob) = victim.date_of_birth {
        parts.push(format!("DOB {}", format_date(dob)));
    }
    if let Some(DobCheck::Inconsistent { delta }) = victim.dob_check {
        parts.push(format!("age/DOB mismatch {delta:+}"));
    }
    parts.join(", ")
}

fn describe_dob_check(check: DobCheck) -> String {
    match check {
        DobCheck::Consistent => "consistent".to_string(),
        DobCheck::Inconsistent { delta } => format!("inconsistent ({delta:+})"),
    }
}

pub struct CountRenderer;

impl Renderer for CountRenderer {
    fn render(&self, records: &[Record], out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "{}", records.len())
    }
}

pub fn format_date(date: NaiveDate) -> String {
    date.format("%m/%d/%Y").to_string()
}

pub fn format_time(time: NaiveTime) -> String {
    time.format("%I:%M %p").to_string()
}
