use std::path::Path;

/// Loads `KEY=VALUE` lines from a dotenv-style file into the process
/// environment. Comments and malformed lines are skipped; surrounding
/// single or double quotes on the value are stripped. Variables already
/// present in the environment win over the file.
pub fn load(path: &Path) {
    let Ok(content) = std::fs::read_to_string(path) else {
        return;
    };
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() || std::env::var_os(key).is_some() {
            continue;
        }
        let value = strip_quotes(value.trim());
        std::env::set_var(key, value);
    }
}

fn strip_quotes(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::{load, strip_quotes};

    #[test]
    fn quotes_are_stripped_only_when_paired() {
        assert_eq!(strip_quotes("\"secret\""), "secret");
        assert_eq!(strip_quotes("'secret'"), "secret");
        assert_eq!(strip_quotes("\"unbalanced"), "\"unbalanced");
        assert_eq!(strip_quotes("plain"), "plain");
        assert_eq!(strip_quotes("\""), "\"");
    }

    #[test]
    fn file_values_load_but_never_override_process_env() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let path = tmp.path().join(".env");
        std::fs::write(
            &path,
            "# comment\nDESKPILOT_TEST_FRESH=from_file\nDESKPILOT_TEST_TAKEN='quoted'\nnot a pair\n",
        )
        .expect("write");
        std::env::set_var("DESKPILOT_TEST_TAKEN", "from_env");
        load(&path);
        assert_eq!(
            std::env::var("DESKPILOT_TEST_FRESH").expect("var"),
            "from_file"
        );
        assert_eq!(
            std::env::var("DESKPILOT_TEST_TAKEN").expect("var"),
            "from_env"
        );
        std::env::remove_var("DESKPILOT_TEST_FRESH");
        std::env::remove_var("DESKPILOT_TEST_TAKEN");
    }

    #[test]
    fn missing_file_is_silently_ignored() {
        load(std::path::Path::new("/nonexistent/definitely/.env"));
    }
}
