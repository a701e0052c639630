/// Case-insensitive glob match supporting `*` (any run) and `?` (one char).
pub fn glob_match(pattern: &str, name: &str) -> bool {
    let pattern: Vec<char> = pattern.to_lowercase().chars().collect();
    let name: Vec<char> = name.to_lowercase().chars().collect();

    let (mut p, mut n) = (0usize, 0usize);
    let mut star: Option<usize> = None;
    let mut resume = 0usize;

    while n < name.len() {
        if p < pattern.len() && (pattern[p] == '?' || pattern[p] == name[n]) {
            p += 1;
            n += 1;
        } else if p < pattern.len() && pattern[p] == '*' {
            star = Some(p);
            resume = n;
            p += 1;
        } else if let Some(s) = star {
            p = s + 1;
            resume += 1;
            n = resume;
        } else {
            return false;
        }
    }
    while p < pattern.len() && pattern[p] == '*' {
        p += 1;
    }
    p == pattern.len()
}

#[cfg(test)]
mod tests {
    use super::glob_match;

    #[test]
    fn literal_names_match_case_insensitively() {
        assert!(glob_match("WinRAR.exe", "winrar.EXE"));
        assert!(!glob_match("winrar.exe", "winrar.exe.bak"));
    }

    #[test]
    fn wildcards() {
        assert!(glob_match("winrar*.exe", "WinRAR-x64-621.exe"));
        assert!(glob_match("doom?.exe", "DOOM2.EXE"));
        assert!(!glob_match("doom?.exe", "doom.exe"));
        assert!(glob_match("*", "anything"));
        assert!(glob_match("*setup*", "office_setup_v2.exe"));
    }
}
