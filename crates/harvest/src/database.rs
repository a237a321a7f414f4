//! SQLite storage for a project's consolidated manifest.
//!
//! The manifest lives at `<project>/pdfs/manifest.db`. It is regenerable from the query
//! tables at any time, with one exception: the operator's duplicate marks, which are carried
//! across re-consolidation by
//! [`project::carry_duplicate_marks`](crate::project::carry_duplicate_marks).

use std::collections::BTreeSet;

use rusqlite::{params, OptionalExtension};
use tokio_rusqlite::Connection;

use super::*;

/// Columns selected for a [`PaperRecord`], in [`row_to_paper`] order.
const PAPER_COLUMNS: &str = "paper_id, title, authors, year, doi, url, article_url, \
                             fulltext_url, abstract_text, source, publisher, cites, \
                             is_duplicate, duplicate_of";

/// Handle to a project's manifest database.
#[derive(Clone)]
pub struct ManifestStore {
  /// Async connection
  conn: Connection,
}

impl ManifestStore {
  /// Opens or creates a manifest database at the specified path.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self, HarvestError> {
    if let Some(parent) = path.as_ref().parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    let conn = Connection::open(path.as_ref()).await?;

    conn
      .call(|conn| {
        conn.execute_batch(include_str!(concat!(
          env!("CARGO_MANIFEST_DIR"),
          "/migrations/init.sql"
        )))?;
        Ok(())
      })
      .await?;

    Ok(Self { conn })
  }

  /// Replaces the whole manifest with `papers` in one transaction.
  pub async fn replace(&self, papers: &[PaperRecord]) -> Result<(), HarvestError> {
    let papers = papers.to_vec();
    let count = papers.len();
    self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM paper_sources", [])?;
        tx.execute("DELETE FROM papers", [])?;

        {
          let mut paper_stmt = tx.prepare_cached(
            "INSERT INTO papers (
               paper_id, title, authors, year, doi, url, article_url, fulltext_url,
               abstract_text, source, publisher, cites, is_duplicate, duplicate_of
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
          )?;
          let mut source_stmt =
            tx.prepare_cached("INSERT INTO paper_sources (paper_id, query_id) VALUES (?1, ?2)")?;

          for paper in &papers {
            paper_stmt.execute(params![
              paper.paper_id as i64,
              paper.title,
              paper.authors,
              paper.year,
              paper.doi,
              paper.url,
              paper.article_url,
              paper.fulltext_url,
              paper.abstract_text,
              paper.source,
              paper.publisher,
              paper.cites.map(|c| c as i64),
              paper.is_duplicate,
              paper.duplicate_of.map(|id| id as i64),
            ])?;
            for query_id in &paper.source_queries {
              source_stmt.execute(params![paper.paper_id as i64, query_id])?;
            }
          }
        }

        tx.execute(
          "INSERT OR REPLACE INTO manifest_meta (key, value) VALUES ('consolidated_at', ?1)",
          [Utc::now().to_rfc3339()],
        )?;
        tx.commit()?;
        Ok(())
      })
      .await?;

    debug!("Manifest replaced with {count} papers");
    Ok(())
  }

  /// Loads the whole manifest ordered by paper id.
  pub async fn load(&self) -> Result<Vec<PaperRecord>, HarvestError> {
    self
      .conn
      .call(|conn| {
        let mut sources: HashMap<u64, BTreeSet<String>> = HashMap::new();
        {
          let mut stmt = conn.prepare_cached("SELECT paper_id, query_id FROM paper_sources")?;
          let rows =
            stmt.query_map([], |row| Ok((row.get::<_, i64>(0)? as u64, row.get::<_, String>(1)?)))?;
          for row in rows {
            let (paper_id, query_id) = row?;
            sources.entry(paper_id).or_default().insert(query_id);
          }
        }

        let mut stmt =
          conn.prepare_cached(&format!("SELECT {PAPER_COLUMNS} FROM papers ORDER BY paper_id"))?;
        let papers = stmt.query_map([], row_to_paper)?;

        let mut result = Vec::new();
        for paper in papers {
          let mut paper = paper?;
          paper.source_queries = sources.remove(&paper.paper_id).unwrap_or_default();
          result.push(paper);
        }
        Ok(result)
      })
      .await
      .map_err(HarvestError::from)
  }

  /// Fetches one paper by id.
  pub async fn get(&self, paper_id: u64) -> Result<Option<PaperRecord>, HarvestError> {
    self
      .conn
      .call(move |conn| {
        let mut stmt =
          conn.prepare_cached(&format!("SELECT {PAPER_COLUMNS} FROM papers WHERE paper_id = ?1"))?;
        let Some(mut paper) = stmt.query_row([paper_id as i64], row_to_paper).optional()? else {
          return Ok(None);
        };

        let mut source_stmt =
          conn.prepare_cached("SELECT query_id FROM paper_sources WHERE paper_id = ?1")?;
        let queries = source_stmt.query_map([paper_id as i64], |row| row.get::<_, String>(0))?;
        paper.source_queries = queries.collect::<Result<_, _>>()?;
        Ok(Some(paper))
      })
      .await
      .map_err(HarvestError::from)
  }

  /// Number of papers in the manifest.
  pub async fn count(&self) -> Result<usize, HarvestError> {
    self
      .conn
      .call(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM papers", [], |row| row.get::<_, i64>(0))?))
      .await
      .map(|count| count as usize)
      .map_err(HarvestError::from)
  }

  /// When the manifest was last replaced.
  pub async fn consolidated_at(&self) -> Result<Option<DateTime<Utc>>, HarvestError> {
    let value = self
      .conn
      .call(|conn| {
        Ok(
          conn
            .query_row(
              "SELECT value FROM manifest_meta WHERE key = 'consolidated_at'",
              [],
              |row| row.get::<_, String>(0),
            )
            .optional()?,
        )
      })
      .await?;

    Ok(value.and_then(|v| DateTime::parse_from_rfc3339(&v).ok()).map(|t| t.with_timezone(&Utc)))
  }

  /// Marks `paper_id` as a duplicate of `duplicate_of`; both must exist.
  ///
  /// The reference paper loses any duplicate mark of its own in the same transaction, so two
  /// papers can never end up skipping each other.
  pub async fn mark_duplicate(&self, paper_id: u64, duplicate_of: u64) -> Result<(), HarvestError> {
    if paper_id == duplicate_of {
      return Err(HarvestError::SelfDuplicate(paper_id));
    }
    if self.get(duplicate_of).await?.is_none() {
      return Err(HarvestError::PaperNotFound(duplicate_of));
    }

    let updated = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let updated = tx.execute(
          "UPDATE papers SET is_duplicate = 1, duplicate_of = ?2 WHERE paper_id = ?1",
          params![paper_id as i64, duplicate_of as i64],
        )?;
        if updated > 0 {
          tx.execute(
            "UPDATE papers SET is_duplicate = 0, duplicate_of = NULL WHERE paper_id = ?1",
            [duplicate_of as i64],
          )?;
          tx.commit()?;
        }
        Ok(updated)
      })
      .await?;

    if updated == 0 {
      return Err(HarvestError::PaperNotFound(paper_id));
    }
    info!("Marked paper {paper_id} as a duplicate of {duplicate_of}");
    Ok(())
  }

  /// Removes a duplicate mark.
  pub async fn clear_duplicate(&self, paper_id: u64) -> Result<(), HarvestError> {
    let updated = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE papers SET is_duplicate = 0, duplicate_of = NULL WHERE paper_id = ?1",
          [paper_id as i64],
        )?)
      })
      .await?;

    if updated == 0 {
      return Err(HarvestError::PaperNotFound(paper_id));
    }
    info!("Cleared duplicate mark on paper {paper_id}");
    Ok(())
  }
}

/// Maps a row selected with [`PAPER_COLUMNS`].
fn row_to_paper(row: &rusqlite::Row<'_>) -> rusqlite::Result<PaperRecord> {
  Ok(PaperRecord {
    paper_id:       row.get::<_, i64>(0)? as u64,
    title:          row.get(1)?,
    authors:        row.get(2)?,
    year:           row.get(3)?,
    doi:            row.get(4)?,
    url:            row.get(5)?,
    article_url:    row.get(6)?,
    fulltext_url:   row.get(7)?,
    abstract_text:  row.get(8)?,
    source:         row.get(9)?,
    publisher:      row.get(10)?,
    cites:          row.get::<_, Option<i64>>(11)?.map(|c| c as u64),
    source_queries: BTreeSet::new(),
    is_duplicate:   row.get(12)?,
    duplicate_of:   row.get::<_, Option<i64>>(13)?.map(|id| id as u64),
  })
}
