//! Skill deduplication, categorization and canonical naming
//!
//! Skills are deduplicated by their normalized key: the lowercased, trimmed
//! name with inner whitespace collapsed, folded onto the canonical spelling
//! when the name is a known alias ("nodejs" and "Node.js" share a key).
//! The category is decided the first time a key is seen and is never
//! recomputed for later duplicates, even if a duplicate carries an explicit
//! category. Input order therefore matters for categories.

use std::collections::HashMap;

use crate::types::{RawSkill, Skill, SkillCategory};

/// Keyword buckets, checked in this order
const CATEGORY_KEYWORDS: &[(SkillCategory, &[&str])] = &[
    (
        SkillCategory::ProgrammingLanguages,
        &[
            "javascript", "typescript", "python", "java", "c", "c++", "c#", "go", "golang",
            "rust", "ruby", "php", "swift", "kotlin", "scala", "r", "perl", "haskell",
            "elixir", "erlang", "clojure", "dart", "lua", "matlab", "objective-c", "bash",
            "shell", "powershell", "sql", "html", "css", "sass", "groovy", "f#", "julia",
        ],
    ),
    (
        SkillCategory::FrameworksLibraries,
        &[
            "react", "reactjs", "angular", "vue", "vuejs", "vue.js", "svelte", "next.js",
            "nextjs", "nuxt", "express", "django", "flask", "fastapi", "spring",
            "spring boot", "rails", "ruby on rails", "laravel", "symfony", ".net", "asp.net",
            "node.js", "nodejs", "node", "jquery", "redux", "tensorflow", "pytorch",
            "pandas", "numpy", "scikit-learn", "bootstrap", "tailwind", "graphql", "tokio",
            "actix", "axum", "flutter", "react native",
        ],
    ),
    (
        SkillCategory::Databases,
        &[
            "mysql", "postgresql", "postgres", "mongodb", "redis", "sqlite", "oracle",
            "sql server", "mssql", "mariadb", "cassandra", "dynamodb", "elasticsearch",
            "neo4j", "couchdb", "firebase", "snowflake", "bigquery", "nosql",
        ],
    ),
    (
        SkillCategory::CloudDevOps,
        &[
            "aws", "amazon web services", "azure", "gcp", "google cloud", "docker",
            "kubernetes", "k8s", "terraform", "ansible", "jenkins", "ci/cd", "devops",
            "helm", "openshift", "heroku", "cloudformation", "github actions",
            "gitlab ci", "prometheus", "grafana", "nginx", "serverless", "lambda",
        ],
    ),
    (
        SkillCategory::ToolsTechnologies,
        &[
            "git", "github", "gitlab", "bitbucket", "jira", "confluence", "linux", "unix",
            "vim", "vscode", "postman", "figma", "webpack", "vite", "npm", "yarn", "maven",
            "gradle", "rest", "api", "graphql api", "kafka", "rabbitmq", "excel", "tableau",
            "power bi", "slack", "agile", "scrum",
        ],
    ),
];

/// Canonical display forms for well-known terms, keyed by normalized key
const CANONICAL_NAMES: &[(&str, &str)] = &[
    ("javascript", "JavaScript"),
    ("typescript", "TypeScript"),
    ("nodejs", "Node.js"),
    ("node.js", "Node.js"),
    ("node", "Node.js"),
    ("reactjs", "React"),
    ("react", "React"),
    ("vuejs", "Vue.js"),
    ("vue", "Vue.js"),
    ("vue.js", "Vue.js"),
    ("nextjs", "Next.js"),
    ("next.js", "Next.js"),
    ("postgresql", "PostgreSQL"),
    ("postgres", "PostgreSQL"),
    ("mysql", "MySQL"),
    ("mongodb", "MongoDB"),
    ("dynamodb", "DynamoDB"),
    ("nosql", "NoSQL"),
    ("sql", "SQL"),
    ("graphql", "GraphQL"),
    ("html", "HTML"),
    ("css", "CSS"),
    ("php", "PHP"),
    ("aws", "AWS"),
    ("gcp", "GCP"),
    ("ci/cd", "CI/CD"),
    ("devops", "DevOps"),
    ("api", "API"),
    ("rest", "REST"),
    ("c#", "C#"),
    ("c++", "C++"),
    (".net", ".NET"),
    ("asp.net", "ASP.NET"),
    ("jquery", "jQuery"),
    ("ios", "iOS"),
    ("macos", "macOS"),
    ("github", "GitHub"),
    ("gitlab", "GitLab"),
    ("k8s", "K8s"),
    ("fastapi", "FastAPI"),
    ("pytorch", "PyTorch"),
    ("tensorflow", "TensorFlow"),
    ("numpy", "NumPy"),
    ("scikit-learn", "scikit-learn"),
    ("vscode", "VSCode"),
    ("power bi", "Power BI"),
];

/// Dedup key for a skill name
pub fn normalized_key(name: &str) -> String {
    let key = name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase();
    match lookup_canonical(&key) {
        Some(display) => display.to_lowercase(),
        None => key,
    }
}

fn lookup_canonical(key: &str) -> Option<&'static str> {
    CANONICAL_NAMES
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, display)| *display)
}

/// Canonical display form for a normalized key.
///
/// Well-known terms come from the lookup table; anything else is title-cased
/// word by word.
pub fn canonical_name(key: &str) -> String {
    if let Some(display) = lookup_canonical(key) {
        return display.to_string();
    }

    key.split_whitespace()
        .map(title_case_word)
        .collect::<Vec<_>>()
        .join(" ")
}

fn title_case_word(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
        None => String::new(),
    }
}

/// Keyword bucket for a key, or `Other`.
///
/// Matching runs in passes over all buckets: the whole key first, then
/// multi-word keywords inside the key, then single tokens. A more specific
/// entry such as "sql server" therefore beats the bare "sql" token. Within a
/// pass, buckets are checked in table order.
pub fn categorize(key: &str) -> SkillCategory {
    first_bucket(|keyword| keyword == key)
        .or_else(|| first_bucket(|keyword| keyword.contains(' ') && key.contains(keyword)))
        .or_else(|| first_bucket(|keyword| !keyword.contains(' ') && has_token(key, keyword)))
        .unwrap_or(SkillCategory::Other)
}

fn first_bucket<F>(matches: F) -> Option<SkillCategory>
where
    F: Fn(&str) -> bool,
{
    CATEGORY_KEYWORDS
        .iter()
        .find(|(_, keywords)| keywords.iter().any(|kw| matches(*kw)))
        .map(|(category, _)| *category)
}

/// Whole-token match, so "go" never matches "mongodb"
fn has_token(key: &str, keyword: &str) -> bool {
    key.split(|c: char| c.is_whitespace() || matches!(c, ',' | '(' | ')' | ';'))
        .any(|token| token == keyword)
}

/// Normalize a raw skill list.
///
/// Output order is first-seen order of each normalized key. When a key repeats,
/// the entry with the strictly higher proficiency (missing counts as zero)
/// supplies name and proficiency; the category stays as first assigned.
pub fn normalize_skills(raw: &[RawSkill]) -> Vec<Skill> {
    let mut skills: Vec<Skill> = Vec::with_capacity(raw.len());
    let mut index: HashMap<String, usize> = HashMap::with_capacity(raw.len());

    for input in raw {
        let key = normalized_key(&input.name);
        if key.is_empty() {
            continue;
        }

        match index.get(&key) {
            Some(&position) => {
                let existing = &skills[position];
                let incoming = input.proficiency.unwrap_or(0.0);
                if incoming > existing.proficiency_or_zero() {
                    let replacement = Skill {
                        name: canonical_name(&key),
                        proficiency: input.proficiency,
                        ..existing.clone()
                    };
                    skills[position] = replacement;
                }
            }
            None => {
                let category = input.category.unwrap_or_else(|| categorize(&key));
                index.insert(key.clone(), skills.len());
                skills.push(Skill {
                    name: canonical_name(&key),
                    normalized_key: key,
                    category,
                    proficiency: input.proficiency,
                });
            }
        }
    }

    skills
}

/// Re-run normalization over already normalized skills
pub fn renormalize(skills: &[Skill]) -> Vec<Skill> {
    let raw: Vec<RawSkill> = skills.iter().map(RawSkill::from).collect();
    normalize_skills(&raw)
}

/// New list with the proficiency of the skill matching `name` replaced.
///
/// The input list is left untouched. Returns `None` when no skill matches.
pub fn with_proficiency(skills: &[Skill], name: &str, proficiency: f32) -> Option<Vec<Skill>> {
    let key = normalized_key(name);
    let position = skills.iter().position(|s| s.normalized_key == key)?;

    Some(
        skills
            .iter()
            .enumerate()
            .map(|(i, skill)| {
                if i == position {
                    Skill {
                        proficiency: Some(proficiency),
                        ..skill.clone()
                    }
                } else {
                    skill.clone()
                }
            })
            .collect(),
    )
}
