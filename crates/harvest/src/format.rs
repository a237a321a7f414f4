//! Deterministic PDF filenames for papers.
//!
//! The filename produced here is also the key used to decide whether a paper has already been
//! fetched, so it must depend on nothing but its inputs. The shape is
//! `{paper_id}_{surname}_{year}{_title_words}.pdf`:
//!
//! - the surname is the last word of the first author (the text before the first `,` or `;`),
//!   stripped to alphanumerics, or `Unknown`,
//! - the year is an integer string, or `Unknown`,
//! - the title part is up to four leading title words longer than two characters, stripped to
//!   alphanumerics and joined with underscores, at most 50 characters.
//!
//! # Examples
//!
//! ```
//! use harvest::format;
//!
//! assert_eq!(format::pdf_filename(123, "Smith, John; Doe, Jane", "2023", ""), "123_Smith_2023.pdf");
//! assert_eq!(format::pdf_filename(789, "", "Unknown", ""), "789_Unknown_Unknown.pdf");
//! assert_eq!(
//!   format::pdf_filename(42, "Ada Lovelace", "1843.0", "Notes on the Analytical Engine"),
//!   "42_Lovelace_1843_Notes_the_Analytical.pdf"
//! );
//! ```

/// Longest title fragment kept in a filename, in characters.
const MAX_TITLE_PART: usize = 50;

/// Filenames longer than this drop their title fragment.
const MAX_FILENAME: usize = 200;

/// Builds the on-disk filename for a paper.
///
/// # Arguments
///
/// * `paper_id` - The paper's stable id within its table
/// * `authors` - Free-text author list, first author first
/// * `year` - Year as exported; `"2023"`, `"2023.0"` and `" 2023 "` all become `2023`
/// * `title` - The paper's title, may be empty
pub fn pdf_filename(paper_id: u64, authors: &str, year: &str, title: &str) -> String {
  let surname = surname(authors);
  let year = clean_year(year);
  let title_part = title_fragment(title);

  let filename = format!("{paper_id}_{surname}_{year}{title_part}.pdf");
  if filename.chars().count() > MAX_FILENAME {
    return format!("{paper_id}_{surname}_{year}.pdf");
  }
  filename
}

/// Extracts the first author's surname, or `"Unknown"`.
///
/// ```
/// use harvest::format::surname;
///
/// assert_eq!(surname("Dr. Jane Doe-Smith"), "DoeSmith");
/// assert_eq!(surname("\"Garcia, M.; Chen, L.\""), "Garcia");
/// assert_eq!(surname("  "), "Unknown");
/// ```
pub fn surname(authors: &str) -> String {
  let authors = authors.trim().trim_matches('"').trim_matches('\'');
  let first_author = authors.split(',').next().unwrap_or_default();
  let first_author = first_author.split(';').next().unwrap_or_default().trim();

  let surname: String = first_author
    .split_whitespace()
    .last()
    .map(|word| word.chars().filter(|c| c.is_alphanumeric()).collect())
    .unwrap_or_default();

  if surname.is_empty() {
    "Unknown".to_string()
  } else {
    surname
  }
}

/// Coerces an exported year into an integer string, or `"Unknown"`.
pub fn clean_year(year: &str) -> String {
  let year = year.trim();
  let digits = year.replace(".0", "");
  if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
    return "Unknown".to_string();
  }

  match year.parse::<f64>() {
    Ok(value) => format!("{}", value.trunc() as i64),
    Err(_) => "Unknown".to_string(),
  }
}

/// Builds the `_word_word` title fragment, or an empty string.
pub fn title_fragment(title: &str) -> String {
  let joined = title
    .split_whitespace()
    .take(4)
    .filter(|word| word.chars().count() > 2)
    .map(|word| word.chars().filter(|c| c.is_alphanumeric()).collect::<String>())
    .collect::<Vec<_>>()
    .join("_");

  let fragment: String = joined.chars().take(MAX_TITLE_PART).collect();
  if fragment.is_empty() {
    fragment
  } else {
    format!("_{fragment}")
  }
}
