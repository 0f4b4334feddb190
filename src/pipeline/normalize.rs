fn is_cyrillic_lower(character: char) -> bool {
    matches!(character, 'а'..='я' | 'ё')
}

pub fn normalize_for_search(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for character in text.chars().flat_map(char::to_lowercase) {
        let character = if character == 'ё' { 'е' } else { character };
        if is_cyrillic_lower(character) {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(character);
        } else {
            pending_space = true;
        }
    }

    out
}

fn letters_only(text: &str) -> String {
    text.chars()
        .flat_map(char::to_lowercase)
        .map(|character| if character == 'ё' { 'е' } else { character })
        .filter(|character| is_cyrillic_lower(*character))
        .collect()
}

pub fn surname_similarity(left: &str, right: &str) -> f64 {
    let left = letters_only(left);
    let right = letters_only(right);
    if left.is_empty() || right.is_empty() {
        return 0.0;
    }

    strsim::normalized_levenshtein(&left, &right)
}
