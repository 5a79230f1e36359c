//! Scenario-level tests exercising the full lex-parse-validate-optimize-run
//! pipeline through [`nandlang::run_source_with_io`] (one scenario per
//! test, asserting observable behavior rather than internal structure).

fn run(src: &str) -> Vec<u8> {
    nandlang::run_source_with_io(src, "test.nand", &[]).expect("program should run successfully")
}

#[test]
fn hello_bit_prints_a_single_one_byte() {
    let out = run("function main() { putb(1); }");
    assert_eq!(out, b"1");
}

#[test]
fn nand_truth_table_matches_boolean_nand() {
    let src = "\
        function main() {\n\
            putb(0 ! 0);\n\
            putb(0 ! 1);\n\
            putb(1 ! 0);\n\
            putb(1 ! 1);\n\
        }";
    assert_eq!(run(src), b"1110");
}

#[test]
fn identity_via_declaration_passes_value_through_a_call() {
    let src = "\
        function identity(a : b) { b = a; }\n\
        function main() { var x = identity(1); putb(x); }";
    assert_eq!(run(src), b"1");
}

#[test]
fn while_loop_counts_down_a_fixed_number_of_iterations() {
    let src = "\
        function main() {\n\
            var done = 0;\n\
            var count = 0;\n\
            while (done ! 1) {\n\
                putb(1);\n\
                done = 1;\n\
            }\n\
            putb(count);\n\
        }";
    assert_eq!(run(src), b"10");
}

#[test]
fn if_else_selects_the_matching_branch() {
    let src = "\
        function main() {\n\
            if (1 ! 1) {\n\
                putb(1);\n\
            } else {\n\
                putb(0);\n\
            }\n\
        }";
    assert_eq!(run(src), b"0");
}

#[test]
fn character_literal_expands_and_round_trips_through_putc() {
    let src = "function main() { var c[8] = 'N'; putc(c); }";
    assert_eq!(run(src), b"N");
}

#[test]
fn getc_reports_end_of_input_through_iogood() {
    let out = nandlang::run_source_with_io(
        "function main() { getc(); var ok = iogood(); putb(ok); }",
        "test.nand",
        &[],
    )
    .unwrap();
    assert_eq!(out, b"0");
}

#[test]
fn getc_reads_a_byte_and_iogood_stays_true() {
    let out = nandlang::run_source_with_io(
        "function main() { var c = getc(); var ok = iogood(); putc(c); putb(ok); }",
        "test.nand",
        b"Z",
    )
    .unwrap();
    assert_eq!(out, [b"Z".as_slice(), b"1".as_slice()].concat());
}

#[test]
fn for_loop_runs_body_once_per_bit_flip() {
    let src = "\
        function main() {\n\
            for i, 0, 1 {\n\
                putb(1);\n\
            }\n\
        }";
    assert_eq!(run(src), b"1");
}

#[test]
fn undeclared_function_call_is_a_compile_error() {
    let err = nandlang::compile("function main() { nope(); }", "t").unwrap_err();
    assert!(err.to_string().contains("undeclared"));
}

#[test]
fn mismatched_assignment_width_is_a_compile_error() {
    assert!(nandlang::compile("function main() { var a, b = 1; }", "t").is_err());
}

#[test]
fn array_out_of_bounds_access_is_rejected_at_parse_time() {
    assert!(nandlang::compile("function main() { var a[2]; var b = a[9]; }", "t").is_err());
}
