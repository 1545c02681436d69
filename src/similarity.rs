// Similarity Scorer - normalized Levenshtein similarity for descriptions

/// Similarity of two strings in [0, 1].
///
/// Both inputs are lowercased, then compared by edit distance normalized by
/// the longer length (in chars):
/// - `similarity("", "") == 1.0`
/// - `similarity("abc", "") == 0.0`
/// - `similarity("Netflix", "netflix") == 1.0`
pub fn similarity(a: &str, b: &str) -> f64 {
    let a = a.to_lowercase();
    let b = b.to_lowercase();

    let len_a = a.chars().count();
    let len_b = b.chars().count();
    let longest = len_a.max(len_b);

    if longest == 0 {
        return 1.0;
    }
    if len_a == 0 || len_b == 0 {
        return 0.0;
    }

    let distance = levenshtein_distance(&a, &b);
    (1.0 - distance as f64 / longest as f64).clamp(0.0, 1.0)
}

/// Levenshtein distance = minimum number of single-character edits
/// (insertions, deletions, substitutions) to change one string into another.
/// Case-sensitive; counts chars, not bytes.
pub fn levenshtein_distance(s1: &str, s2: &str) -> usize {
    let s1_chars: Vec<char> = s1.chars().collect();
    let s2_chars: Vec<char> = s2.chars().collect();
    let len1 = s1_chars.len();
    let len2 = s2_chars.len();

    if len1 == 0 {
        return len2;
    }
    if len2 == 0 {
        return len1;
    }

    let mut matrix = vec![vec![0usize; len2 + 1]; len1 + 1];

    for (i, row) in matrix.iter_mut().enumerate() {
        row[0] = i;
    }
    for j in 0..=len2 {
        matrix[0][j] = j;
    }

    for i in 1..=len1 {
        for j in 1..=len2 {
            let cost = if s1_chars[i - 1] == s2_chars[j - 1] { 0 } else { 1 };

            matrix[i][j] = (matrix[i - 1][j] + 1) // deletion
                .min(matrix[i][j - 1] + 1) // insertion
                .min(matrix[i - 1][j - 1] + cost); // substitution
        }
    }

    matrix[len1][len2]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_distance() {
        assert_eq!(levenshtein_distance("", ""), 0);
        assert_eq!(levenshtein_distance("abc", "abc"), 0);
        assert_eq!(levenshtein_distance("abc", "ab"), 1);
        assert_eq!(levenshtein_distance("abc", "abcd"), 1);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("", "netflix"), 7);
    }

    #[test]
    fn test_levenshtein_counts_chars_not_bytes() {
        assert_eq!(levenshtein_distance("café", "cafe"), 1);
        assert_eq!(levenshtein_distance("niño", "nino"), 1);
    }

    #[test]
    fn test_similarity_empty_strings() {
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("coffee", ""), 0.0);
        assert_eq!(similarity("", "coffee"), 0.0);
    }

    #[test]
    fn test_similarity_case_insensitive() {
        assert_eq!(similarity("Netflix Subscription", "netflix subscription"), 1.0);
    }

    #[test]
    fn test_similarity_normalized_by_longer_string() {
        // kitten -> sitting: distance 3 over 7 chars
        let score = similarity("kitten", "sitting");
        assert!((score - (1.0 - 3.0 / 7.0)).abs() < 1e-12);
    }

    #[test]
    fn test_similarity_completely_different() {
        assert_eq!(similarity("abc", "xyz"), 0.0);
    }

    #[test]
    fn test_similarity_symmetric() {
        let pairs = [("Starbucks", "STARBUCKS #4521"), ("uber eats", "uber"), ("", "x")];
        for (a, b) in pairs {
            assert_eq!(similarity(a, b), similarity(b, a));
        }
    }
}
