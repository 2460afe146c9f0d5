//! Tests for template rendering.

use crate::pipeline::{
    PipelineError, PullRequestTemplates,
    template::{TemplateContext, render},
};
use rstest::rstest;

#[rstest]
fn absent_optional_values_render_empty() {
    let context = TemplateContext::new()
        .with("file_path", "src/a.ts")
        .with_optional("coverage_before", None);
    let rendered = render("t", "{{ file_path }}[{{ coverage_before }}]", &context)
        .expect("template renders");
    assert_eq!(rendered, "src/a.ts[]");
}

#[rstest]
fn broken_template_names_the_template() {
    let result = render("pull_request.title", "{{ unclosed", &TemplateContext::new());
    assert!(matches!(
        result,
        Err(PipelineError::Template { ref name, .. }) if name == "pull_request.title"
    ));
}

#[rstest]
fn default_body_lists_created_files_and_coverage() {
    let templates = PullRequestTemplates::default();
    let context = TemplateContext::new()
        .with("file_path", "src/a.ts")
        .with_optional("coverage_before", Some("40.00%".to_owned()))
        .with_list("created_files", &["src/a.test.ts".to_owned()])
        .with_list("modified_files", &[]);
    let body = render("pull_request.body", &templates.body, &context).expect("body renders");

    assert!(body.contains("| Before | 40.00% |"));
    assert!(body.contains("| After | unknown |"));
    assert!(body.contains("- `src/a.test.ts`"));
    assert!(!body.contains("Modified:"));
}
