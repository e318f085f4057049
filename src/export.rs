use anyhow::Context;
use std::path::{Path, PathBuf};

pub const CLASS_SUMMARY_HEADERS: [&str; 5] = [
    "Student Name",
    "Class",
    "Days Present",
    "Days Absent",
    "Attendance %",
];

pub const CLASS_ATTENDANCE_HEADERS: [&str; 5] = [
    "Student Name",
    "Days Present",
    "Days Absent",
    "Total Days",
    "Attendance Rate (%)",
];

/// Every field is quoted; embedded quotes are doubled.
pub fn csv_quote(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

/// Header line as-is, then one quoted line per row. No trailing newline.
pub fn to_csv(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut lines = Vec::with_capacity(rows.len() + 1);
    lines.push(headers.join(","));
    for row in rows {
        let cells: Vec<String> = headers
            .iter()
            .enumerate()
            .map(|(i, _)| csv_quote(row.get(i).map(String::as_str).unwrap_or("")))
            .collect();
        lines.push(cells.join(","));
    }
    lines.join("\n")
}

/// Turns a class name into something safe to use as a file name.
pub fn file_stem(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() {
        "class".to_string()
    } else {
        cleaned
    }
}

/// Resolves the output file: an explicit path wins, otherwise `default_name`
/// inside the given directory.
pub fn resolve_out_path(
    out_path: Option<&str>,
    out_dir: Option<&str>,
    default_name: &str,
) -> Option<PathBuf> {
    if let Some(p) = out_path.map(str::trim).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(p));
    }
    out_dir
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(|d| Path::new(d).join(default_name))
}

pub fn write_csv(path: &Path, contents: &str) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create directory {}", parent.to_string_lossy())
            })?;
        }
    }
    std::fs::write(path, contents)
        .with_context(|| format!("failed to write {}", path.to_string_lossy()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quotes_every_field_and_doubles_quotes() {
        assert_eq!(csv_quote("plain"), "\"plain\"");
        assert_eq!(csv_quote("say \"hi\""), "\"say \"\"hi\"\"\"");
        assert_eq!(csv_quote(""), "\"\"");
    }

    #[test]
    fn headers_are_not_quoted_and_missing_cells_are_blank() {
        let csv = to_csv(
            &["Student Name", "Days Present"],
            &[
                vec!["Doe, Jane".to_string(), "4".to_string()],
                vec!["Solo".to_string()],
            ],
        );
        assert_eq!(
            csv,
            "Student Name,Days Present\n\"Doe, Jane\",\"4\"\n\"Solo\",\"\""
        );
    }

    #[test]
    fn empty_report_is_just_the_header() {
        assert_eq!(to_csv(&CLASS_SUMMARY_HEADERS, &[]), CLASS_SUMMARY_HEADERS.join(","));
    }

    #[test]
    fn file_stem_strips_separators() {
        assert_eq!(file_stem("P6/B"), "P6_B");
        assert_eq!(file_stem("  "), "class");
        assert_eq!(file_stem("Senior 2"), "Senior 2");
    }

    #[test]
    fn explicit_out_path_wins_over_directory() {
        assert_eq!(
            resolve_out_path(Some("/tmp/a.csv"), Some("/tmp/dir"), "x.csv"),
            Some(PathBuf::from("/tmp/a.csv"))
        );
        assert_eq!(
            resolve_out_path(None, Some("/tmp/dir"), "x.csv"),
            Some(PathBuf::from("/tmp/dir/x.csv"))
        );
        assert_eq!(resolve_out_path(Some(" "), None, "x.csv"), None);
    }
}
