//! Porcelain status parsing
//!
//! Parses `git status -b -u --porcelain=v1 -z` into a [`GitStatus`].

use super::types::{GitStatus, GitStatusEntry};

/// Single status char (X or Y) to a code string
fn char_to_code(c: char) -> String {
    match c {
        '?' => "??".to_string(),
        '!' => "!!".to_string(),
        _ => c.to_string(),
    }
}

/// Parse the `## ` branch header.
///
/// Forms: `## main`, `## main...origin/main [ahead 1, behind 2]`,
/// `## No commits yet on main`, `## HEAD (no branch)`.
fn parse_branch_header(header: &str, status: &mut GitStatus) {
    let header = header.trim_end();
    if let Some(branch) = header.strip_prefix("No commits yet on ") {
        status.local_branch = Some(branch.to_string());
        return;
    }
    if let Some(branch) = header.strip_prefix("Initial commit on ") {
        status.local_branch = Some(branch.to_string());
        return;
    }
    if header.starts_with("HEAD (no branch)") {
        return;
    }

    let (branches, tracking) = match header.split_once(" [") {
        Some((b, t)) => (b, Some(t.trim_end_matches(']'))),
        None => (header, None),
    };
    match branches.split_once("...") {
        Some((local, remote)) => {
            status.local_branch = Some(local.to_string());
            status.remote_branch = Some(remote.to_string());
        }
        None => status.local_branch = Some(branches.to_string()),
    }

    for part in tracking.into_iter().flat_map(|t| t.split(", ")) {
        if let Some(n) = part.strip_prefix("ahead ") {
            status.ahead = n.parse().unwrap_or(0);
        } else if let Some(n) = part.strip_prefix("behind ") {
            status.behind = n.parse().unwrap_or(0);
        }
    }
}

/// Parse git status --porcelain=v1 -z output
///
/// Format: XY PATH\0 or XY ORIG_PATH\0PATH\0 for renames.
/// X = index (staged), Y = work tree (unstaged). Each line yields zero, one or
/// two entries so staged and unstaged changes stay distinct.
pub fn parse_porcelain_status(output: &str) -> GitStatus {
    let mut status = GitStatus::default();
    let parts: Vec<&str> = output.split('\0').collect();

    let mut i = 0;
    while i < parts.len() {
        let part = parts[i];
        if let Some(header) = part.strip_prefix("## ") {
            parse_branch_header(header, &mut status);
            i += 1;
            continue;
        }
        if part.len() < 3 {
            i += 1;
            continue;
        }

        let x = part.chars().next().unwrap_or(' ');
        let y = part.chars().nth(1).unwrap_or(' ');
        let path_str = &part[3..];

        // Rename/copy: with -z the new path comes first, then the original
        let (path, orig_path, advance) = if (x == 'R' || x == 'C' || y == 'R' || y == 'C')
            && i + 1 < parts.len()
            && !parts[i + 1].is_empty()
        {
            (path_str.to_string(), Some(parts[i + 1].to_string()), 2)
        } else {
            (path_str.to_string(), None, 1)
        };

        // ??/!! only ever describe the work tree
        if (x == '?' && y == '?') || (x == '!' && y == '!') {
            status.entries.push(GitStatusEntry {
                path,
                code: char_to_code(x),
                orig_path,
                staged: false,
            });
            i += advance;
            continue;
        }

        if x != ' ' {
            status.entries.push(GitStatusEntry {
                path: path.clone(),
                code: char_to_code(x),
                orig_path: orig_path.clone(),
                staged: true,
            });
        }
        if y != ' ' {
            status.entries.push(GitStatusEntry {
                path,
                code: char_to_code(y),
                orig_path,
                staged: false,
            });
        }
        i += advance;
    }

    status
}
