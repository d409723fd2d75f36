//! Pipeline Tests
//!
//! Whole-component compilations through [`Compiler`]: fatal diagnostics stop the
//! unit, warnings reach the callback, and the wrapped output keeps the script intact.

#[cfg(test)]
mod tests {
    use crate::compile::{
        compile, CompileOptions, Compiler, FragmentBuilder, GenerationContext, VAR_CSS_ID,
    };
    use crate::diagnostics::{
        CompileError, Locator, ERR_DEFAULT_EXPORT, ERR_MISSING_REF, ERR_PARSE,
        WARN_CSS_UNUSED_SELECTOR, WARN_UNUSED_HELPER, WARN_UNUSED_TRANSITION,
    };
    use crate::emit::{CodeBuilder, CodeTemplate};
    use crate::ir::{
        AttributeValue, ComponentInput, DeclaredMember, Directive, ElementNode, ExpressionRef,
        MemberCategory, SourceSpan, TagNode, TemplateNode,
    };
    use crate::scope::IdentifierKind;
    use crate::wrap::ModuleFormat;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn span_of(source: &str, needle: &str) -> SourceSpan {
        let start = source.find(needle).expect("needle in source") as u32;
        SourceSpan::new(start, start + needle.len() as u32)
    }

    /// Span of the text between `<script>` and `</script>`.
    fn script_span(source: &str) -> SourceSpan {
        let start = source.find("<script>").expect("script tag") + "<script>".len();
        let end = source.find("</script>").expect("closing script tag");
        SourceSpan::new(start as u32, end as u32)
    }

    fn style_span(source: &str) -> SourceSpan {
        let start = source.find("<style>").expect("style tag") + "<style>".len();
        let end = source.find("</style>").expect("closing style tag");
        SourceSpan::new(start as u32, end as u32)
    }

    fn element(source: &str, name: &str, attributes: Vec<Directive>) -> TemplateNode {
        TemplateNode::Element(ElementNode {
            name: name.to_string(),
            attributes,
            children: vec![],
            span: span_of(source, &format!("<{}", name)),
        })
    }

    fn counter_input() -> ComponentInput {
        let source = "<p>{count}</p>\n<script>\n\timport format from './format.js';\n\tlet count = 0;\n</script>";
        let expression = span_of(source, "count}");
        ComponentInput {
            source: source.to_string(),
            filename: None,
            script: Some(script_span(source)),
            template: vec![TemplateNode::MustacheTag(TagNode {
                expression: ExpressionRef::new(expression.start, expression.start + 5),
                span: span_of(source, "{count}"),
            })],
            style: None,
            members: vec![],
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // OUTPUT SHAPE
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_es_output() {
        let input = counter_input();
        let output = compile(&input, CompileOptions::default()).expect("compiled");

        assert!(
            output.code.starts_with(
                "import { assign, init, proto } from \"component-runtime/shared.js\";\n\
                 import format from \"./format.js\";\n"
            ),
            "unexpected intro:\n{}",
            output.code
        );
        assert!(output.code.contains("\tlet count = 0;"));
        assert!(!output.code.contains("import format from './format.js'"));
        assert!(output.code.contains("function Component(options) {\n\tinit(this, options);\n}"));
        assert!(output.code.contains("assign(Component.prototype, proto);"));
        assert!(output.code.ends_with("export default Component;\n"));

        let names: Vec<_> = output.imported_helpers.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["assign", "init", "proto"]);
        assert!(output.diagnostics.is_empty());
        assert_eq!(output.map.sources, vec!["input.html".to_string()]);
    }

    #[test]
    fn test_script_maps_back_to_source() {
        let input = counter_input();
        let output = compile(&input, CompileOptions::default()).expect("compiled");

        let generated = output.code.find("let count").expect("script kept");
        let (line, column) = Locator::new(&output.code).locate(&output.code, generated);
        let original = input.source.find("let count").unwrap();
        let expected = Locator::new(&input.source).locate(&input.source, original);
        assert_eq!(output.map.original_position(line, column), Some(expected));
        assert_eq!(output.map.sources_content, vec![input.source.clone()]);
    }

    #[test]
    fn test_cjs_output() {
        let input = counter_input();
        let options = CompileOptions {
            format: ModuleFormat::Cjs,
            shared_path: Some("./shared.js".to_string()),
            ..CompileOptions::default()
        };
        let output = compile(&input, options).expect("compiled");
        assert!(output.code.starts_with("\"use strict\";"));
        assert!(output
            .code
            .contains("var { assign, init, proto } = require(\"./shared.js\");"));
        assert!(output.code.contains("var format = require(\"./format.js\");"));
        assert!(output.code.ends_with("module.exports = Component;\n"));
    }

    #[test]
    fn test_component_name_is_deconflicted() {
        let source = "<script>\n\tfunction Widget() {}\n\tlet init = 1;\n</script>";
        let input = ComponentInput {
            source: source.to_string(),
            script: Some(script_span(source)),
            ..ComponentInput::default()
        };
        let options = CompileOptions {
            name: "Widget".to_string(),
            ..CompileOptions::default()
        };
        let output = compile(&input, options).expect("compiled");

        assert!(output.code.contains("function Widget_1(options)"));
        assert!(output.code.contains("export default Widget_1;"));
        // The user's `init` forces the bootstrap helper under another name.
        assert!(output.code.contains("init as init_1"));
        assert!(output.code.contains("\tinit_1(this, options);"));
    }

    #[test]
    fn test_dev_uses_variants_and_stable_names() {
        let input = counter_input();
        let options = CompileOptions {
            dev: true,
            ..CompileOptions::default()
        };
        let output = compile(&input, options).expect("compiled");

        let helpers: Vec<_> = output
            .imported_helpers
            .iter()
            .map(|h| (h.name.as_str(), h.alias.as_str()))
            .collect();
        assert_eq!(
            helpers,
            vec![("assign", "assign$"), ("init", "init$"), ("protoDev", "protoDev$")]
        );
        assert!(output.code.contains("assign$(Component$.prototype, protoDev$);"));
    }

    #[test]
    fn test_component_without_script() {
        let source = "<p>static</p>";
        let input = ComponentInput {
            source: source.to_string(),
            filename: Some("Static.html".to_string()),
            template: vec![element(source, "p", vec![])],
            ..ComponentInput::default()
        };
        let output = compile(&input, CompileOptions::default()).expect("compiled");
        assert_eq!(output.map.sources, vec!["Static.html".to_string()]);
        assert_eq!(output.map.sources_content, vec![String::new()]);
    }

    #[test]
    fn test_template_globals_are_reported_as_globals() {
        let source = "<p>{Math.round(count)}</p>\n<script>\n\tlet count = 0;\n</script>";
        let expression = span_of(source, "Math.round(count)");
        let input = ComponentInput {
            source: source.to_string(),
            script: Some(script_span(source)),
            template: vec![TemplateNode::MustacheTag(TagNode {
                expression: ExpressionRef::new(expression.start, expression.end),
                span: span_of(source, "{Math.round(count)}"),
            })],
            ..ComponentInput::default()
        };
        let output = compile(&input, CompileOptions::default()).expect("compiled");

        let math: Vec<_> = output.identifiers.iter().filter(|i| i.name == "Math").collect();
        assert_eq!(math.len(), 1);
        assert_eq!(math[0].kind, IdentifierKind::FreeGlobal);
        assert!(!output
            .identifiers
            .iter()
            .any(|i| i.name == "count" && i.kind == IdentifierKind::FreeGlobal));
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // FATAL DIAGNOSTICS
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_missing_ref_from_script() {
        let source = "<canvas ref:camera></canvas>\n<script>\n\tfunction snap() { return this.refs.camra.toDataURL(); }\n</script>";
        let input = ComponentInput {
            source: source.to_string(),
            script: Some(script_span(source)),
            template: vec![element(
                source,
                "canvas",
                vec![Directive::Ref {
                    name: "camera".to_string(),
                    span: span_of(source, "ref:camera"),
                }],
            )],
            ..ComponentInput::default()
        };
        let err = compile(&input, CompileOptions::default()).expect_err("missing ref");
        assert_eq!(err.code(), ERR_MISSING_REF);
        let diagnostic = err.diagnostic().expect("positioned");
        assert!(diagnostic.message.contains("camera"), "{}", diagnostic.message);
        assert_eq!(diagnostic.start.line, 3);
    }

    #[test]
    fn test_declared_ref_compiles() {
        let source = "<canvas ref:camera></canvas>\n<script>\n\tfunction snap() { return this.refs.camera; }\n</script>";
        let input = ComponentInput {
            source: source.to_string(),
            script: Some(script_span(source)),
            template: vec![element(
                source,
                "canvas",
                vec![Directive::Ref {
                    name: "camera".to_string(),
                    span: span_of(source, "ref:camera"),
                }],
            )],
            ..ComponentInput::default()
        };
        assert!(compile(&input, CompileOptions::default()).is_ok());
    }

    #[test]
    fn test_default_export_is_fatal() {
        let source = "<script>\n\texport default { data() { return {}; } };\n</script>";
        let input = ComponentInput {
            source: source.to_string(),
            filename: Some("Legacy.html".to_string()),
            script: Some(script_span(source)),
            ..ComponentInput::default()
        };
        let err = compile(&input, CompileOptions::default()).expect_err("default export");
        assert_eq!(err.code(), ERR_DEFAULT_EXPORT);
        let diagnostic = err.diagnostic().expect("positioned");
        assert_eq!(diagnostic.filename, "Legacy.html");
        assert_eq!(diagnostic.start.line, 2);
        assert_eq!(diagnostic.start.column, 1);
        assert!(diagnostic.frame.contains("2:   export default"));
    }

    #[test]
    fn test_script_syntax_error_is_fatal() {
        let source = "<script>let = ;</script>";
        let input = ComponentInput {
            source: source.to_string(),
            script: Some(script_span(source)),
            ..ComponentInput::default()
        };
        let err = compile(&input, CompileOptions::default()).expect_err("parse error");
        assert_eq!(err.code(), ERR_PARSE);
    }

    #[test]
    fn test_script_syntax_error_points_at_token() {
        let source = "<p>hi</p>\n<script>\n\tlet a = 1;\n\tlet c = ;\n</script>";
        let input = ComponentInput {
            source: source.to_string(),
            script: Some(script_span(source)),
            ..ComponentInput::default()
        };
        let err = compile(&input, CompileOptions::default()).expect_err("parse error");
        let diagnostic = err.diagnostic().expect("positioned");
        assert_eq!(diagnostic.start.line, 4);
        assert_eq!(diagnostic.start.column, 9);
        assert_eq!(diagnostic.start.offset as usize, source.find(" ;").unwrap() + 1);
        assert!(diagnostic.frame.contains("4:   let c = ;\n             ^"), "{}", diagnostic.frame);
    }

    #[test]
    fn test_expression_syntax_error_points_at_token() {
        let source = "<p>{a + * b}</p>";
        let expression = span_of(source, "a + * b");
        let input = ComponentInput {
            source: source.to_string(),
            template: vec![TemplateNode::MustacheTag(TagNode {
                expression: ExpressionRef::new(expression.start, expression.end),
                span: span_of(source, "{a + * b}"),
            })],
            ..ComponentInput::default()
        };
        let err = compile(&input, CompileOptions::default()).expect_err("parse error");
        assert_eq!(err.code(), ERR_PARSE);
        let diagnostic = err.diagnostic().expect("positioned");
        assert_eq!(diagnostic.start.line, 1);
        assert_eq!(diagnostic.start.offset as usize, source.find('*').unwrap());
    }

    #[test]
    fn test_fragment_with_unknown_variable_is_internal() {
        struct Broken;
        impl FragmentBuilder for Broken {
            fn build(&self, _cx: &mut GenerationContext<'_, '_>) -> Result<CodeTemplate, CompileError> {
                Ok(CodeTemplate::parse("%nowhere"))
            }
        }

        let input = counter_input();
        let err = Compiler::new(CompileOptions::default())
            .with_fragment(Broken)
            .compile(&input)
            .expect_err("unresolved variable");
        assert!(matches!(err, CompileError::Internal(_)));
        assert_eq!(err.code(), "unresolved-template-var");
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // WARNINGS
    // ═══════════════════════════════════════════════════════════════════════════════

    #[test]
    fn test_unused_members_warn_through_callback() {
        let source = "<div in:fade>{shout(name)}</div>\n<script>\n\tfunction shout(s) { return s; }\n\tfunction whisper(s) { return s; }\n\tlet name = 'x';\n</script>";
        let call = span_of(source, "shout(name)");
        let member = |category, name: &str| DeclaredMember {
            category,
            name: name.to_string(),
            span: span_of(source, &format!("function {}", name)),
        };
        let input = ComponentInput {
            source: source.to_string(),
            script: Some(script_span(source)),
            template: vec![TemplateNode::Element(ElementNode {
                name: "div".to_string(),
                attributes: vec![Directive::Transition {
                    name: "fade".to_string(),
                    intro: true,
                    outro: false,
                    expression: None,
                    span: span_of(source, "in:fade"),
                }],
                children: vec![TemplateNode::MustacheTag(TagNode {
                    expression: ExpressionRef::new(call.start, call.end),
                    span: span_of(source, "{shout(name)}"),
                })],
                span: span_of(source, "<div"),
            })],
            members: vec![
                member(MemberCategory::Helper, "shout"),
                member(MemberCategory::Helper, "whisper"),
                DeclaredMember {
                    category: MemberCategory::Transition,
                    name: "slide".to_string(),
                    span: span_of(source, "let name"),
                },
            ],
            ..ComponentInput::default()
        };

        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let output = Compiler::new(CompileOptions::default())
            .on_warning(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .compile(&input)
            .expect("compiled");

        let codes: Vec<_> = output.diagnostics.iter().map(|d| d.code.as_str()).collect();
        assert_eq!(codes, vec![WARN_UNUSED_HELPER, WARN_UNUSED_TRANSITION]);
        assert_eq!(output.diagnostics[0].message, "The 'whisper' helper is unused");
        assert_eq!(output.diagnostics[0].start.line, 4);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_warnings_do_not_change_output() {
        let mut input = counter_input();
        let quiet = compile(&input, CompileOptions::default()).expect("compiled");
        input.members.push(DeclaredMember {
            category: MemberCategory::Helper,
            name: "unused".to_string(),
            span: SourceSpan::new(0, 1),
        });
        let noisy = compile(&input, CompileOptions::default()).expect("compiled");
        assert_eq!(noisy.diagnostics.len(), 1);
        assert_eq!(quiet.code, noisy.code);
        assert_eq!(quiet.map, noisy.map);
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // STYLE
    // ═══════════════════════════════════════════════════════════════════════════════

    fn styled_input() -> ComponentInput {
        let source = "<p class=\"lead\">hi</p>\n<style>.lead { color: red; } .ghost { color: blue; }</style>";
        ComponentInput {
            source: source.to_string(),
            template: vec![element(
                source,
                "p",
                vec![Directive::Attribute {
                    name: "class".to_string(),
                    value: vec![AttributeValue::Text {
                        data: "lead".to_string(),
                        span: span_of(source, "lead"),
                    }],
                    span: span_of(source, "class=\"lead\""),
                }],
            )],
            style: Some(style_span(source)),
            ..ComponentInput::default()
        }
    }

    #[test]
    fn test_style_scope_id_and_injection() {
        let input = styled_input();
        let output = compile(&input, CompileOptions::default()).expect("compiled");

        let css = output.css.as_ref().expect("css output");
        assert_eq!(css.code, ".lead { color: red; } .ghost { color: blue; }");
        assert!(output.code.contains("this._css = \"c-"));
        assert!(output
            .code
            .contains("this._styles = \".lead { color: red; } .ghost { color: blue; }\";"));

        assert_eq!(output.diagnostics.len(), 1);
        assert_eq!(output.diagnostics[0].code, WARN_CSS_UNUSED_SELECTOR);
        assert!(output.diagnostics[0].message.contains(".ghost"));
    }

    #[test]
    fn test_custom_element_does_not_inject_css() {
        let input = styled_input();
        let options = CompileOptions {
            custom_element: true,
            ..CompileOptions::default()
        };
        let output = compile(&input, options).expect("compiled");
        assert!(!output.code.contains("this._styles"));
        assert!(output.css.as_ref().and_then(|css| css.map.as_ref()).is_some());
    }

    // ═══════════════════════════════════════════════════════════════════════════════
    // COLLABORATORS
    // ═══════════════════════════════════════════════════════════════════════════════

    struct RegionFragment;

    impl FragmentBuilder for RegionFragment {
        fn build(&self, cx: &mut GenerationContext<'_, '_>) -> Result<CodeTemplate, CompileError> {
            let mut region = cx.registry.child_allocator();
            let temp = region.unique_name("count");
            let css_id = cx.template_vars.get(VAR_CSS_ID).unwrap_or("none").to_string();
            Ok(CodeBuilder::new()
                .literal(format!("var {} = ", temp))
                .helper("noop")
                .literal(format!("; // {}", css_id))
                .build())
        }
    }

    #[test]
    fn test_custom_fragment_allocates_scoped_names() {
        let input = counter_input();
        let output = Compiler::new(CompileOptions::default())
            .with_fragments(vec![Box::new(RegionFragment)])
            .compile(&input)
            .expect("compiled");

        // `count` belongs to the script, so the region's temporary moves aside.
        assert!(output.code.contains("var count_1 = noop; // none"));
        let names: Vec<_> = output.imported_helpers.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["init", "noop"]);
    }

    struct ShadowingFragment;

    impl FragmentBuilder for ShadowingFragment {
        fn build(&self, cx: &mut GenerationContext<'_, '_>) -> Result<CodeTemplate, CompileError> {
            let temp = cx.registry.child_allocator().unique_name("set");
            Ok(CodeTemplate::parse(&format!("var {} = 1; @set(this, {{}});", temp)))
        }
    }

    #[test]
    fn test_region_temporaries_avoid_helper_aliases() {
        let source = "<script>\n\tfunction set() {}\n</script>";
        let input = ComponentInput {
            source: source.to_string(),
            script: Some(script_span(source)),
            ..ComponentInput::default()
        };
        let output = Compiler::new(CompileOptions::default())
            .with_fragments(vec![Box::new(ShadowingFragment)])
            .compile(&input)
            .expect("compiled");

        assert!(output.code.contains("import { init, set as set_1 }"), "{}", output.code);
        assert!(output.code.contains("var set_2 = 1; set_1(this, {});"), "{}", output.code);
    }

    #[test]
    fn test_batch_keeps_order_and_isolation() {
        let good = counter_input();
        let bad_source = "<script>export default 1;</script>";
        let bad = ComponentInput {
            source: bad_source.to_string(),
            script: Some(script_span(bad_source)),
            ..ComponentInput::default()
        };

        let results = Compiler::new(CompileOptions::default()).compile_batch(&[
            good.clone(),
            bad,
            good,
        ]);
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert_eq!(
            results[1].as_ref().map(|_| ()).map_err(|e| e.code().to_string()),
            Err(ERR_DEFAULT_EXPORT.to_string())
        );
        let (first, third) = (results[0].as_ref().unwrap(), results[2].as_ref().unwrap());
        assert_eq!(first.code, third.code);
    }

    #[test]
    fn test_input_and_options_from_json() {
        let input: ComponentInput = serde_json::from_str(
            r#"{
                "source": "<p>{x}</p>",
                "filename": "X.html",
                "template": [
                    { "type": "mustache-tag", "expression": { "span": { "start": 4, "end": 5 } },
                      "span": { "start": 3, "end": 6 } }
                ]
            }"#,
        )
        .expect("valid input");
        let options: CompileOptions =
            serde_json::from_str(r#"{ "customElement": true, "format": "cjs", "name": "X" }"#)
                .expect("valid options");
        assert!(options.custom_element);
        assert!(options.css, "css defaults to on");

        let output = compile(&input, options).expect("compiled");
        assert!(output.code.ends_with("module.exports = X;\n"));
        let json = serde_json::to_string(&output).expect("serializable");
        assert!(json.contains("\"importedHelpers\""));
    }
}
