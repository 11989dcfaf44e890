use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

/// Boilerplate phrases removed from label text before tokenization. Matching
/// is case-insensitive and `.` crosses newlines. More specific phrases come
/// before phrases they contain ("CONTAINS 2% OR LESS OF:" before
/// "CONTAINS 2%") so each one is removed whole. Extending the catalog never
/// touches the parsing logic below.
const DISCLAIMER_PATTERNS: &[&str] = &[
    r"EXCEPT FOR .*",
    r"FOR COLOR",
    r"CONTAINS TRACES OF .*",
    r"MAY CONTAIN .*",
    r"CANADA GRADE .*",
    r"SEASONING INGREDIENTS?:",
    r"SOLUTION INGREDIENTS?:",
    r"CONTAINS LESS THAN [\d% ]*OF:",
    r"CONTAINS 2% OR LESS OF:",
    r"CONTAINS:",
    r"MADE WITH SMILES",
    r"MADE WITH:",
    r"LESS OF:",
    r"BASTED WITH UP TO 16% ADDED SOLUTION OF",
    r"BASTED NTE 16% ADDED SOLUTION OF",
    r"5% OR LESS OF THE FOLLOWING:",
    r"CONTAINS 2%",
    r"BASTED WITH UP TO 16% SOLUTION OF",
    r"BREADED WITH",
    r"NOT MORE THAN 2% SILICON DIOXIDE ADDED TO PREVENT CAKING",
    r"CONTAINING UP TO 15% OF A SOLUTION OF WATER",
    r"PREBROWNED IN",
    r"CONTAINING UP TO 12% OF A SOLUTION OF WATER",
    r"IINGREDIENTS:",
    r"CONTAIN UP TO 18% SOLUTION OF WATER",
    r"COATING INGREDIENTS:",
    r"ADDED AS A PRESERVATIVE",
    r"CONTAINS UP TO 7%",
    r"MECHANICALLY SEPARATED",
    r"ADDS A DIETARILY INSIGNIFICANT AMOUNT OF SATURATED FAT",
    r"OF EACH OF THE FOLLOWING:",
    r"ADDED TO PROTECT FLAVOR",
];

// Stripped from the start of the string only, after disclaimer removal.
const PREFIX_PATTERNS: &[&str] = &[r"^INGREDIENTS?:", r"^MADE FROM:"];

static DISCLAIMERS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    DISCLAIMER_PATTERNS
        .iter()
        .map(|pattern| {
            Regex::new(&format!("(?is){pattern}")).expect("disclaimer pattern must compile")
        })
        .collect()
});

static PREFIXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    PREFIX_PATTERNS
        .iter()
        .map(|pattern| Regex::new(&format!("(?i){pattern}")).expect("prefix pattern must compile"))
        .collect()
});

static WRAPPED_PARENS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)\((.*)\)$").expect("wrapped parens pattern must compile"));

static WRAPPED_BRACKETS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(.*?)\[(.*)\]$").expect("wrapped brackets pattern must compile")
});

static CONNECTORS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\s+AND/OR\s+|\s+AND\s+|\s+OR\s+").expect("connector pattern must compile")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedIngredient {
    pub name: String,
    pub sub_ingredients: Vec<String>,
}

/// Turn raw label text into an ordered list of ingredients with their
/// parenthetical sub-ingredients.
///
/// The input is upper-cased, stripped of disclaimer boilerplate, then split
/// on commas outside `(...)`/`[...]`. A token whose trailing parenthetical
/// wraps the whole remainder becomes one ingredient with sub-ingredients;
/// any other token splits on " AND/OR " / " AND " / " OR " into independent
/// ingredients. Never fails: malformed text degrades to literal ingredient
/// names. Duplicates within one label are preserved; downstream joins
/// deduplicate across rows.
pub fn parse_ingredients(raw: &str) -> Vec<ParsedIngredient> {
    if raw.is_empty() {
        return Vec::new();
    }

    let mut text = raw.to_uppercase();
    for disclaimer in DISCLAIMERS.iter() {
        text = disclaimer.replace_all(&text, "").into_owned();
    }
    for prefix in PREFIXES.iter() {
        text = prefix.replace(&text, "").trim().to_string();
    }

    // Periods act as list separators on some labels.
    let text = text.replace('*', "").replace('.', ",");

    let mut parsed = Vec::new();
    for token in split_top_level(&text) {
        parse_token(token, &mut parsed);
    }

    parsed
}

/// Split on commas at bracket depth zero. Unbalanced closers push the depth
/// negative, which suppresses splitting for the rest of the token.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;

    for (idx, ch) in text.char_indices() {
        match ch {
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            ',' if depth == 0 => {
                let token = text[start..idx].trim();
                if !token.is_empty() {
                    tokens.push(token);
                }
                start = idx + 1;
            }
            _ => {}
        }
    }

    let token = text[start..].trim();
    if !token.is_empty() {
        tokens.push(token);
    }

    tokens
}

fn parse_token(token: &str, out: &mut Vec<ParsedIngredient>) {
    let wrapped = WRAPPED_PARENS
        .captures(token)
        .or_else(|| WRAPPED_BRACKETS.captures(token));

    match wrapped {
        Some(captures) => {
            let name = captures[1].trim().to_string();
            let inside = captures[2].trim().to_string();

            let mut sub_ingredients = Vec::new();
            for inner in split_top_level(&inside) {
                sub_ingredients.extend(
                    CONNECTORS
                        .split(inner)
                        .map(str::trim)
                        .filter(|sub| !sub.is_empty())
                        .map(str::to_string),
                );
            }

            if !name.is_empty() {
                out.push(ParsedIngredient {
                    name,
                    sub_ingredients,
                });
            }
        }
        None => out.extend(
            CONNECTORS
                .split(token)
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(|name| ParsedIngredient {
                    name: name.to_string(),
                    sub_ingredients: Vec::new(),
                }),
        ),
    }
}
