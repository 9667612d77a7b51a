//! Rewrite prompt construction.
//!
//! Section order is contractual: system prompt, schema, hints, few-shot
//! examples, safety constraints, target SQL. Cache fingerprints hash the
//! rendered prompt, so any reordering would silently invalidate the cache.

use common_config::OptimizationGoal;

/// Schema context for one table.
#[derive(Debug, Clone, Default)]
pub struct TableSchema {
    /// Table name.
    pub table_name: String,
    /// Column names.
    pub columns: Vec<String>,
    /// Primary key columns.
    pub primary_keys: Vec<String>,
    /// Foreign key descriptions (`col -> other_table.col`).
    pub foreign_keys: Vec<String>,
    /// Full CREATE statement, preferred over the column list when present.
    pub create_statement: String,
}

/// A worked rewrite example shown to the model.
#[derive(Debug, Clone)]
pub struct FewShotExample {
    /// Query before rewriting.
    pub original_sql: String,
    /// Query after rewriting.
    pub optimized_sql: String,
    /// Why the rewrite helps.
    pub explanation: String,
    /// Observed speedup factor.
    pub speedup_ratio: f64,
}

/// At most this many examples are rendered into a prompt.
const MAX_RENDERED_EXAMPLES: usize = 3;

const PERFORMANCE_PROMPT: &str = "\
You are an expert SQL performance engineer. Rewrite inefficient SQL queries \
for better execution performance while keeping results exactly identical.

Principles:
1. The rewrite MUST be semantically equivalent: same rows, same columns.
2. Prefer joins over correlated subqueries, push filters toward the data, \
avoid redundant work.
3. Output ONLY the rewritten SQL, no commentary.";

const READABILITY_PROMPT: &str = "\
You are an expert SQL reviewer. Rewrite convoluted SQL queries into clearer, \
simpler forms without changing their results.

Principles:
1. The rewrite MUST be semantically equivalent: same rows, same columns.
2. Prefer straightforward joins and named columns over nested constructions.
3. Output ONLY the rewritten SQL, no commentary.";

const BALANCED_PROMPT: &str = "\
You are an expert SQL engineer. Rewrite SQL queries to be both faster and \
clearer, without changing their results.

Principles:
1. The rewrite MUST be semantically equivalent: same rows, same columns.
2. Balance execution efficiency against readability; never trade correctness.
3. Output ONLY the rewritten SQL, no commentary.";

const SAFETY_CONSTRAINTS: &str = "\
## Constraints

1. Preserve exact semantic equivalence: identical result sets for every \
possible database state.
2. Do not add, drop, or reorder output columns unless the original order was \
unspecified.
3. Put the rewritten query inside a ```sql code block.
4. If no safe improvement exists, return the original query unchanged.";

/// Catalog of rewrite techniques the hints section can reference.
const TECHNIQUES: &[(&str, &str)] = &[
    (
        "subquery_unnesting",
        "Convert correlated subqueries to JOINs when possible",
    ),
    (
        "predicate_pushdown",
        "Push filter conditions closer to data sources",
    ),
    (
        "join_reordering",
        "Reorder joins to reduce intermediate result size",
    ),
    (
        "redundancy_elimination",
        "Remove redundant conditions and operations",
    ),
    ("in_to_join", "Convert IN subqueries to JOIN operations"),
    ("exists_to_join", "Convert EXISTS subqueries to JOIN operations"),
];

/// Assembles rewrite prompts from configuration, schema context, and
/// examples.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    system_prompt: Option<String>,
    goal: OptimizationGoal,
    examples: Vec<FewShotExample>,
    hints: Vec<String>,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PromptBuilder {
    /// Builder with the performance goal and no examples or hints.
    pub fn new() -> Self {
        Self {
            system_prompt: None,
            goal: OptimizationGoal::Performance,
            examples: Vec::new(),
            hints: Vec::new(),
        }
    }

    /// Override the built-in system prompt.
    pub fn set_system_prompt(&mut self, prompt: impl Into<String>) {
        self.system_prompt = Some(prompt.into());
    }

    /// Select the built-in system prompt by goal. A prompt set explicitly
    /// wins over the goal.
    pub fn set_goal(&mut self, goal: OptimizationGoal) {
        self.goal = goal;
    }

    /// Append a worked example.
    pub fn add_few_shot_example(&mut self, example: FewShotExample) {
        self.examples.push(example);
    }

    /// Replace the hint list. Hints naming a known technique render with its
    /// description; others render as given.
    pub fn set_hints(&mut self, hints: Vec<String>) {
        self.hints = hints;
    }

    /// Load the built-in example set (TPC-DS-flavoured rewrites).
    pub fn load_builtin_examples(&mut self) {
        self.add_few_shot_example(FewShotExample {
            original_sql: "SELECT * FROM customer\n\
                           WHERE c_customer_sk IN (\n\
                           \x20   SELECT ss_customer_sk FROM store_sales\n\
                           \x20   WHERE ss_sales_price > 100\n)"
                .to_string(),
            optimized_sql: "SELECT DISTINCT c.*\n\
                            FROM customer c\n\
                            JOIN store_sales ss ON c.c_customer_sk = ss.ss_customer_sk\n\
                            WHERE ss.ss_sales_price > 100"
                .to_string(),
            explanation: "IN subquery converted to a join".to_string(),
            speedup_ratio: 3.2,
        });
        self.add_few_shot_example(FewShotExample {
            original_sql: "SELECT * FROM (\n\
                           \x20   SELECT * FROM orders o\n\
                           \x20   JOIN order_items oi ON o.order_id = oi.order_id\n\
                           ) t\nWHERE t.order_date > '2023-01-01'"
                .to_string(),
            optimized_sql: "SELECT *\n\
                            FROM orders o\n\
                            JOIN order_items oi ON o.order_id = oi.order_id\n\
                            WHERE o.order_date > '2023-01-01'"
                .to_string(),
            explanation: "Filter pushed below the derived table".to_string(),
            speedup_ratio: 2.5,
        });
        self.add_few_shot_example(FewShotExample {
            original_sql: "SELECT c_customer_id FROM customer c\n\
                           WHERE EXISTS (\n\
                           \x20   SELECT 1 FROM store_sales ss\n\
                           \x20   WHERE ss.ss_customer_sk = c.c_customer_sk\n\
                           \x20   AND ss.ss_sales_price > 50\n)"
                .to_string(),
            optimized_sql: "SELECT DISTINCT c.c_customer_id\n\
                            FROM customer c\n\
                            JOIN store_sales ss ON c.c_customer_sk = ss.ss_customer_sk\n\
                            WHERE ss.ss_sales_price > 50"
                .to_string(),
            explanation: "EXISTS converted to a join that can use indexes".to_string(),
            speedup_ratio: 4.1,
        });
    }

    fn system_section(&self) -> &str {
        match &self.system_prompt {
            Some(prompt) => prompt,
            None => match self.goal {
                OptimizationGoal::Performance => PERFORMANCE_PROMPT,
                OptimizationGoal::Readability => READABILITY_PROMPT,
                OptimizationGoal::Balanced => BALANCED_PROMPT,
            },
        }
    }

    /// Render the full rewrite prompt.
    pub fn build_rewrite_prompt(
        &self,
        original_sql: &str,
        schemas: &[TableSchema],
        use_few_shot: bool,
    ) -> String {
        let mut parts: Vec<String> = vec![self.system_section().to_string(), String::new()];

        if !schemas.is_empty() {
            parts.push("## Database Schema".to_string());
            parts.push(String::new());
            for schema in schemas {
                parts.push(format!("### Table: {}", schema.table_name));
                if !schema.create_statement.is_empty() {
                    parts.push(format!("```sql\n{}\n```", schema.create_statement));
                } else {
                    parts.push(format!("Columns: {}", schema.columns.join(", ")));
                    if !schema.primary_keys.is_empty() {
                        parts.push(format!("Primary keys: {}", schema.primary_keys.join(", ")));
                    }
                    if !schema.foreign_keys.is_empty() {
                        parts.push(format!("Foreign keys: {}", schema.foreign_keys.join(", ")));
                    }
                }
                parts.push(String::new());
            }
        }

        if !self.hints.is_empty() {
            parts.push("## Techniques to Consider".to_string());
            parts.push(String::new());
            for hint in &self.hints {
                match TECHNIQUES.iter().find(|(name, _)| name == hint) {
                    Some((name, description)) => {
                        parts.push(format!("- **{name}**: {description}"));
                    }
                    None => parts.push(format!("- {hint}")),
                }
            }
            parts.push(String::new());
        }

        if use_few_shot && !self.examples.is_empty() {
            parts.push("## Example Rewrites".to_string());
            parts.push(String::new());
            for (index, example) in self.examples.iter().take(MAX_RENDERED_EXAMPLES).enumerate() {
                parts.push(format!(
                    "### Example {} (speedup {:.1}x)",
                    index + 1,
                    example.speedup_ratio
                ));
                parts.push(format!("Original:\n```sql\n{}\n```", example.original_sql));
                parts.push(format!("Rewritten:\n```sql\n{}\n```", example.optimized_sql));
                if !example.explanation.is_empty() {
                    parts.push(format!("*{}*", example.explanation));
                }
                parts.push(String::new());
            }
        }

        parts.push(SAFETY_CONSTRAINTS.to_string());
        parts.push(String::new());
        parts.push("## Query to Rewrite".to_string());
        parts.push(String::new());
        parts.push(format!("```sql\n{original_sql}\n```"));

        parts.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> TableSchema {
        TableSchema {
            table_name: "customer".to_string(),
            columns: vec!["c_customer_sk".to_string(), "c_customer_id".to_string()],
            primary_keys: vec!["c_customer_sk".to_string()],
            ..TableSchema::default()
        }
    }

    #[test]
    fn test_section_order_is_fixed() {
        let mut builder = PromptBuilder::new();
        builder.set_hints(vec!["subquery_unnesting".to_string()]);
        builder.load_builtin_examples();

        let prompt = builder.build_rewrite_prompt("SELECT 1 FROM t", &[schema()], true);

        let schema_at = prompt.find("## Database Schema").unwrap();
        let hints_at = prompt.find("## Techniques to Consider").unwrap();
        let examples_at = prompt.find("## Example Rewrites").unwrap();
        let constraints_at = prompt.find("## Constraints").unwrap();
        let target_at = prompt.find("## Query to Rewrite").unwrap();

        assert!(schema_at < hints_at);
        assert!(hints_at < examples_at);
        assert!(examples_at < constraints_at);
        assert!(constraints_at < target_at);
    }

    #[test]
    fn test_prompt_is_deterministic() {
        let mut builder = PromptBuilder::new();
        builder.load_builtin_examples();
        let a = builder.build_rewrite_prompt("SELECT * FROM t", &[schema()], true);
        let b = builder.build_rewrite_prompt("SELECT * FROM t", &[schema()], true);
        assert_eq!(a, b);
    }

    #[test]
    fn test_few_shot_can_be_disabled() {
        let mut builder = PromptBuilder::new();
        builder.load_builtin_examples();
        let prompt = builder.build_rewrite_prompt("SELECT * FROM t", &[], false);
        assert!(!prompt.contains("## Example Rewrites"));
    }

    #[test]
    fn test_goal_selects_system_prompt() {
        let mut builder = PromptBuilder::new();
        builder.set_goal(OptimizationGoal::Readability);
        let prompt = builder.build_rewrite_prompt("SELECT * FROM t", &[], false);
        assert!(prompt.starts_with("You are an expert SQL reviewer."));
    }

    #[test]
    fn test_explicit_system_prompt_wins() {
        let mut builder = PromptBuilder::new();
        builder.set_goal(OptimizationGoal::Readability);
        builder.set_system_prompt("Custom instructions.");
        let prompt = builder.build_rewrite_prompt("SELECT * FROM t", &[], false);
        assert!(prompt.starts_with("Custom instructions."));
    }

    #[test]
    fn test_example_cap() {
        let mut builder = PromptBuilder::new();
        for i in 0..5 {
            builder.add_few_shot_example(FewShotExample {
                original_sql: format!("SELECT {i} FROM t"),
                optimized_sql: format!("SELECT {i} FROM t"),
                explanation: String::new(),
                speedup_ratio: 1.0,
            });
        }
        let prompt = builder.build_rewrite_prompt("SELECT * FROM t", &[], true);
        assert!(prompt.contains("### Example 3"));
        assert!(!prompt.contains("### Example 4"));
    }
}
