//! Manual download guides.
//!
//! A guide lists what a run fetched and, in detail, everything an operator needs to fetch the
//! rest by hand: metadata, the filename the pipeline would have used, every candidate URL in
//! the order the pipeline tried them, the hint message, and a ready-made citation.

use std::fmt::Write;

use html_escape::{encode_double_quoted_attribute as attr, encode_text as text};

use super::*;
use crate::resolve::{resolve_candidates, CandidateQuery};

/// Steps shown at the top of every guide.
const INSTRUCTIONS: [&str; 5] = [
  "For each paper marked as \"Manual Required\", try the provided URLs in order",
  "Look for PDF download links on the publisher's page",
  "If you have institutional access, try accessing through your library",
  "Save the PDF with the suggested filename in the manual downloads directory",
  "Use the DOI for academic search engines if direct links don't work",
];

/// Papers grouped by what the guide does with them.
struct Sections<'a> {
  /// Downloaded in this run or already present
  fetched: Vec<(&'a PaperRecord, &'a AcquisitionOutcome)>,
  /// Needing an operator
  manual:  Vec<(&'a PaperRecord, &'a AcquisitionOutcome)>,
}

impl<'a> Sections<'a> {
  /// Splits a run into guide sections.
  fn new(papers: &'a [PaperRecord], outcomes: &'a [AcquisitionOutcome]) -> Self {
    let mut fetched = Vec::new();
    let mut manual = Vec::new();
    for pair in papers.iter().zip(outcomes) {
      match pair.1.status() {
        AcquisitionStatus::Success | AcquisitionStatus::AlreadyExisted => fetched.push(pair),
        AcquisitionStatus::ManualRequired => manual.push(pair),
        AcquisitionStatus::Failed | AcquisitionStatus::NotFound | AcquisitionStatus::Skipped => {},
      }
    }
    Self { fetched, manual }
  }
}

/// `"12.5 KB"`, or `"N/A"`.
fn size_kb(outcome: &AcquisitionOutcome) -> String {
  outcome.file_size().map_or_else(|| "N/A".to_string(), |size| format!("{:.1} KB", size as f64 / 1024.0))
}

/// File name of an outcome's PDF, or `"N/A"`.
fn file_name(outcome: &AcquisitionOutcome) -> String {
  outcome
    .file_path()
    .and_then(Path::file_name)
    .map_or_else(|| "N/A".to_string(), |name| name.to_string_lossy().into_owned())
}

/// `"Authors (Year)"` with defaults.
fn byline(paper: &PaperRecord) -> String {
  format!(
    "{} ({})",
    paper.authors().unwrap_or("Unknown Authors"),
    paper.year().unwrap_or("Unknown Year")
  )
}

/// The plain-text guide.
pub(super) fn text_guide(
  scope: &ReportScope,
  papers: &[PaperRecord],
  outcomes: &[AcquisitionOutcome],
) -> String {
  let sections = Sections::new(papers, outcomes);
  let mut out = String::new();

  let _ = writeln!(out, "MANUAL DOWNLOAD GUIDE - {}", scope.heading().to_uppercase());
  let _ = writeln!(out, "Generated: {}", Local::now().format("%Y-%m-%d %H:%M:%S"));
  let _ = writeln!(out, "{}\n", "=".repeat(60));
  let _ = writeln!(out, "DOWNLOAD SUMMARY");
  let _ = writeln!(out, "Total papers: {}", outcomes.len());
  let _ = writeln!(out, "Downloaded or already present: {}", sections.fetched.len());
  let _ = writeln!(out, "Require manual download: {}\n", sections.manual.len());
  let _ = writeln!(out, "INSTRUCTIONS FOR MANUAL DOWNLOAD");
  for (step, instruction) in INSTRUCTIONS.iter().enumerate() {
    let _ = writeln!(out, "{}. {instruction}", step + 1);
  }

  if !sections.fetched.is_empty() {
    let _ = writeln!(out, "\nDOWNLOADED PAPERS ({})\n{}", sections.fetched.len(), "-".repeat(50));
    for (paper, outcome) in &sections.fetched {
      let _ = writeln!(out, "\n[{}] {}", outcome.paper_id(), outcome.status().label().to_uppercase());
      let _ = writeln!(out, "Title: {}", outcome.title());
      let _ = writeln!(out, "Authors: {}", byline(paper));
      let _ = writeln!(out, "File: {}", file_name(outcome));
      let _ = writeln!(out, "Size: {}", size_kb(outcome));
    }
  }

  if !sections.manual.is_empty() {
    let _ = writeln!(
      out,
      "\n\nPAPERS REQUIRING MANUAL DOWNLOAD ({})\n{}",
      sections.manual.len(),
      "-".repeat(50)
    );
    for (paper, outcome) in &sections.manual {
      let _ = writeln!(out, "\n[{}] MANUAL REQUIRED", outcome.paper_id());
      let _ = writeln!(out, "Title: {}", outcome.title());
      let _ = writeln!(out, "Authors: {}", byline(paper));
      let _ = writeln!(out, "Citations: {}", paper.cites.unwrap_or(0));
      let _ = writeln!(out, "Source: {}", paper.source().unwrap_or_default());
      let _ = writeln!(out, "Publisher: {}", paper.publisher().unwrap_or_default());
      let _ = writeln!(out, "Suggested filename: {}", paper.pdf_filename());
      if let Some(doi) = paper.doi() {
        let _ = writeln!(out, "DOI: {doi}");
      }
      if let Some(reason) = outcome.error_message() {
        let _ = writeln!(out, "Why: {reason}");
      }

      let _ = writeln!(out, "\nURLs to try (in order):");
      let candidates = resolve_candidates(&CandidateQuery::from(*paper));
      if candidates.is_empty() {
        let _ = writeln!(out, "  No direct URLs available - try searching by title and authors");
      }
      for (n, candidate) in candidates.iter().enumerate() {
        let _ = writeln!(out, "  {}. {}: {}", n + 1, candidate.source.description(), candidate.url);
      }

      if let Some(abstract_text) = paper.abstract_text() {
        let _ = writeln!(out, "\nAbstract: {abstract_text}");
      }
      let _ = writeln!(out, "\nCitation: {}", paper.citation());
      let _ = writeln!(out, "{}", "-".repeat(40));
    }
  }

  out
}

/// Stylesheet of the HTML guide.
const STYLE: &str = r#"
    body { font-family: Arial, sans-serif; margin: 20px; line-height: 1.6; }
    .header { background-color: #f4f4f4; padding: 20px; border-radius: 5px; margin-bottom: 20px; }
    .summary { background-color: #e8f5e8; padding: 15px; border-radius: 5px; margin-bottom: 20px; }
    .instructions { background-color: #fff3cd; padding: 15px; border-radius: 5px;
                    margin-bottom: 20px; border-left: 4px solid #ffc107; }
    .paper { border: 1px solid #ddd; margin: 10px 0; padding: 15px; border-radius: 5px; }
    .paper.manual { background-color: #fff5f5; }
    .paper.success { background-color: #f0f8f0; }
    .paper.existed { background-color: #f0f0ff; }
    .paper-id { font-weight: bold; color: #333; }
    .title { font-size: 1.1em; font-weight: bold; color: #0066cc; margin: 5px 0; }
    .authors { font-style: italic; margin: 5px 0; }
    .metadata-item { margin: 5px 0; }
    .url-item { margin: 5px 0; padding: 5px; background-color: #f9f9f9; border-radius: 3px; }
    .url-link { color: #0066cc; text-decoration: none; word-break: break-all; }
    .status { display: inline-block; padding: 3px 8px; border-radius: 3px; font-size: 0.9em;
              font-weight: bold; }
    .status.manual { background-color: #ffebee; color: #c62828; }
    .status.success { background-color: #e8f5e8; color: #2e7d32; }
    .status.existed { background-color: #e3f2fd; color: #1565c0; }
    .citation { background-color: #f5f5f5; padding: 10px; border-radius: 3px; margin-top: 10px;
                font-family: monospace; font-size: 0.9em; }
"#;

/// The HTML guide. Every piece of paper metadata is escaped.
pub(super) fn html_guide(
  scope: &ReportScope,
  papers: &[PaperRecord],
  outcomes: &[AcquisitionOutcome],
) -> String {
  let sections = Sections::new(papers, outcomes);
  let heading = text(&scope.heading()).into_owned();
  let mut out = String::new();

  let _ = write!(
    out,
    "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n  <meta charset=\"UTF-8\">\n  <title>Manual \
     Download Guide - {heading}</title>\n  <style>{STYLE}  </style>\n</head>\n<body>\n"
  );
  let _ = writeln!(
    out,
    "  <div class=\"header\">\n    <h1>Manual Download Guide - {heading}</h1>\n    \
     <p>Generated: {}</p>\n  </div>",
    Local::now().format("%Y-%m-%d %H:%M:%S")
  );
  let _ = writeln!(
    out,
    "  <div class=\"summary\">\n    <h2>Download Summary</h2>\n    <ul>\n      \
     <li><strong>Total papers:</strong> {}</li>\n      <li><strong>Downloaded or already \
     present:</strong> {}</li>\n      <li><strong>Require manual download:</strong> \
     {}</li>\n    </ul>\n  </div>",
    outcomes.len(),
    sections.fetched.len(),
    sections.manual.len()
  );

  let _ = writeln!(out, "  <div class=\"instructions\">\n    <h3>Instructions</h3>\n    <ol>");
  for instruction in INSTRUCTIONS {
    let _ = writeln!(out, "      <li>{}</li>", text(instruction));
  }
  let _ = writeln!(out, "    </ol>\n  </div>");

  if !sections.fetched.is_empty() {
    let _ = writeln!(out, "  <h2>Downloaded Papers ({})</h2>", sections.fetched.len());
    for (paper, outcome) in &sections.fetched {
      let (class, label) = match outcome.status() {
        AcquisitionStatus::AlreadyExisted => ("existed", "ALREADY PRESENT"),
        _ => ("success", "DOWNLOADED"),
      };
      let _ = writeln!(
        out,
        "  <div class=\"paper {class}\">\n    <div class=\"paper-id\">Paper ID: {}</div>\n    \
         <div class=\"title\">{}</div>\n    <div class=\"authors\">{}</div>\n    <span \
         class=\"status {class}\">{label}</span>\n    <div>File: {}</div>\n    <div>Size: \
         {}</div>\n  </div>",
        outcome.paper_id(),
        text(outcome.title()),
        text(&byline(paper)),
        text(&file_name(outcome)),
        size_kb(outcome)
      );
    }
  }

  if !sections.manual.is_empty() {
    let _ = writeln!(out, "  <h2>Papers Requiring Manual Download ({})</h2>", sections.manual.len());
    for (paper, outcome) in &sections.manual {
      let _ = writeln!(
        out,
        "  <div class=\"paper manual\">\n    <div class=\"paper-id\">Paper ID: {}</div>\n    \
         <div class=\"title\">{}</div>\n    <div class=\"authors\">{}</div>\n    <span \
         class=\"status manual\">MANUAL REQUIRED</span>",
        outcome.paper_id(),
        text(outcome.title()),
        text(&byline(paper))
      );
      let mut items = vec![
        ("Suggested filename", paper.pdf_filename()),
        ("Citations", paper.cites.unwrap_or(0).to_string()),
        ("Source", paper.source().unwrap_or_default().to_string()),
        ("Publisher", paper.publisher().unwrap_or_default().to_string()),
      ];
      if let Some(reason) = outcome.error_message() {
        items.push(("Why", reason.to_string()));
      }
      for (name, value) in items {
        let _ = writeln!(
          out,
          "    <div class=\"metadata-item\"><strong>{name}:</strong> {}</div>",
          text(&value)
        );
      }
      if let Some(doi) = paper.doi() {
        let _ = writeln!(
          out,
          "    <div class=\"metadata-item\"><strong>DOI:</strong> {}</div>",
          text(doi)
        );
      }

      let _ = writeln!(out, "    <div class=\"url-list\">\n      <h4>URLs to try, in order:</h4>");
      let candidates = resolve_candidates(&CandidateQuery::from(*paper));
      if candidates.is_empty() {
        let _ = writeln!(
          out,
          "      <div class=\"url-item\">No direct URLs available - try searching by title and \
           authors</div>"
        );
      }
      for candidate in &candidates {
        let _ = writeln!(
          out,
          "      <div class=\"url-item\"><strong>{}:</strong><br><a href=\"{}\" \
           class=\"url-link\" target=\"_blank\">{}</a></div>",
          candidate.source.description(),
          attr(&candidate.url),
          text(&candidate.url)
        );
      }
      let _ = writeln!(out, "    </div>");

      if let Some(abstract_text) = paper.abstract_text() {
        let _ = writeln!(
          out,
          "    <div class=\"abstract\"><strong>Abstract:</strong><br>{}</div>",
          text(abstract_text)
        );
      }
      let _ = writeln!(
        out,
        "    <div class=\"citation\"><strong>Citation:</strong><br>{}</div>\n  </div>",
        text(&paper.citation())
      );
    }
  }

  out.push_str("</body>\n</html>\n");
  out
}
