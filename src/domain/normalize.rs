//! Natural-key normalization shared by the import resolvers and the IPC writers.

use sha2::{Digest, Sha256};

const CODE_STOPWORDS: &[&str] = &[
    "a", "o", "e", "de", "da", "do", "das", "dos", "em", "na", "no", "campus",
];

pub fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Trimmed, whitespace-collapsed text, or `None` when nothing is left.
pub fn non_blank(s: &str) -> Option<String> {
    let t = collapse_whitespace(s);
    if t.is_empty() {
        None
    } else {
        Some(t)
    }
}

/// Every alphabetic run starts upper-case and continues lower-case.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for ch in collapse_whitespace(s).chars() {
        if ch.is_alphabetic() {
            if at_word_start {
                out.extend(ch.to_uppercase());
            } else {
                out.extend(ch.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(ch);
            at_word_start = true;
        }
    }
    out
}

pub fn normalize_email(s: &str) -> Option<String> {
    let t = s.trim().to_lowercase();
    if t.is_empty() {
        None
    } else {
        Some(t)
    }
}

/// Case-insensitive lookup key for a name.
pub fn name_key(s: &str) -> String {
    collapse_whitespace(s).to_lowercase()
}

pub fn fold_accents(s: &str) -> String {
    s.chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'É' | 'È' | 'Ê' | 'Ë' => 'E',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
            'ç' => 'c',
            'Ç' => 'C',
            'ñ' => 'n',
            'Ñ' => 'N',
            other => other,
        })
        .collect()
}

fn ascii_words(s: &str) -> Vec<String> {
    fold_accents(s)
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(|w| w.to_ascii_uppercase())
        .collect()
}

fn code_body(name: &str) -> String {
    let words = ascii_words(name);
    let significant: Vec<&String> = words
        .iter()
        .filter(|w| !CODE_STOPWORDS.contains(&w.to_ascii_lowercase().as_str()))
        .collect();
    if significant.is_empty() {
        words.concat()
    } else {
        significant.into_iter().map(String::as_str).collect()
    }
}

/// Six-character campus code, e.g. `Campus Central Norte` -> `CENTRA`.
pub fn campus_code(name: &str) -> String {
    let body = code_body(name);
    if body.is_empty() {
        "CAMPUS".to_string()
    } else {
        body.chars().take(6).collect()
    }
}

/// Longer fallback code: twelve characters plus a name hash suffix.
pub fn long_campus_code(name: &str) -> String {
    let body: String = code_body(name).chars().take(12).collect();
    let digest = Sha256::digest(name_key(name).as_bytes());
    format!("{}-{:02X}{:02X}", body, digest[0], digest[1])
}

pub fn slugify(name: &str) -> String {
    let words: Vec<String> = ascii_words(name)
        .into_iter()
        .map(|w| w.to_ascii_lowercase())
        .collect();
    if words.is_empty() {
        "type".to_string()
    } else {
        words.join("-")
    }
}

pub fn acronym(name: &str) -> String {
    let words = ascii_words(name);
    let significant: Vec<&String> = words
        .iter()
        .filter(|w| !CODE_STOPWORDS.contains(&w.to_ascii_lowercase().as_str()))
        .collect();
    match significant.as_slice() {
        [] => words.concat(),
        [single] => (*single).clone(),
        many => many.iter().filter_map(|w| w.chars().next()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_case_handles_accents_and_hyphens() {
        assert_eq!(title_case("  joão   DA silva "), "João Da Silva");
        assert_eq!(title_case("maria-clara d'ávila"), "Maria-Clara D'Ávila");
    }

    #[test]
    fn emails_are_lowercased_and_blank_is_none() {
        assert_eq!(normalize_email(" Ana@UFX.br "), Some("ana@ufx.br".to_string()));
        assert_eq!(normalize_email("   "), None);
    }

    #[test]
    fn derived_keys_are_deterministic() {
        assert_eq!(campus_code("Campus Central Norte"), "CENTRA");
        assert_eq!(campus_code("São João"), "SAOJOA");
        assert_eq!(long_campus_code("Campus Central Norte"), long_campus_code("campus central  norte"));
        assert!(long_campus_code("Campus Central Norte").starts_with("CENTRALNORTE-"));
        assert_eq!(slugify("Iniciação Científica (PIBIC)"), "iniciacao-cientifica-pibic");
        assert_eq!(acronym("Fundação de Amparo à Pesquisa"), "FAP");
        assert_eq!(acronym("CNPq"), "CNPQ");
    }

    #[test]
    fn name_key_ignores_case_and_spacing() {
        assert_eq!(name_key("  Campus   NORTE"), name_key("campus norte"));
    }
}
