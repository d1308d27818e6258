use super::*;

fn run_ok(src: &str) -> Analysis {
    match crate::run(src) {
        Ok(a) => a,
        Err(e) => panic!("analysis failed for {:?}: {}", src, e),
    }
}

fn hm(src: &str) -> String {
    run_ok(src).hm
}

fn flow(src: &str) -> String {
    run_ok(src).flow_sig.to_string()
}

// ── Constants ────────────────────────────────────────────────

#[test]
fn int_constant() {
    let a = run_ok("5");
    assert_eq!(a.hm, "5");
    assert_eq!(a.flow_sig.to_string(), "5");
    assert!(a.errs.is_empty());
}

#[test]
fn flt_constant() {
    assert_eq!(hm("1.2"), "1.2");
    assert_eq!(flow("1.2"), "1.2");
}

#[test]
fn str_constant() {
    assert_eq!(hm("\"abc\""), "\"abc\"");
    assert_eq!(flow("\"abc\""), "\"abc\"");
}

#[test]
fn nil_constant() {
    // 0 is the nil constant: a nilable fresh var.
    assert_eq!(hm("0"), "A?");
    assert_eq!(flow("0"), "nil");
}

// ── Lambdas and application ──────────────────────────────────

#[test]
fn identity() {
    let a = run_ok("{ x -> x }");
    assert_eq!(a.hm, "{ A -> A }");
    // Escaping args are assumed worst-case callable.
    assert_eq!(a.flow_sig.to_string(), "[2]{ 1 -> Scalar }");
}

#[test]
fn self_apply_builds_a_cycle() {
    // x applied to itself: a recursive type, not an occurs-check error.
    assert_eq!(hm("{ x -> (x x) }"), "{ A:{ A -> B } -> B }");
}

#[test]
fn apply_non_function_is_an_error() {
    // The constant 3 is forced into function shape; the clash lives on
    // its var and the apply result stays free.
    let a = run_ok("(3 5)");
    assert!(
        a.errs.iter().any(|e| e.contains("Cannot unify")),
        "errors: {:?}",
        a.errs
    );
}

#[test]
fn monomorphic_arg_conflict_is_an_error() {
    // x is lambda-bound, so both uses share one var: int meets string.
    let a = run_ok("{ x -> (pair (x 3) (x \"abc\")) }");
    assert!(a.hm.contains("Cannot unify"), "got {}", a.hm);
}

// ── Records ──────────────────────────────────────────────────

#[test]
fn pair_of_constants() {
    let a = run_ok("(pair 3 \"abc\")");
    assert_eq!(a.hm, "@{0=3, 1=\"abc\"}");
    assert_eq!(a.flow_sig.to_string(), "*@{0=3, 1=\"abc\"}");
}

#[test]
fn triple_of_constants() {
    assert_eq!(hm("(triple 1 2 3)"), "@{0=1, 1=2, 2=3}");
    assert_eq!(flow("(triple 1 2 3)"), "*@{0=1, 1=2, 2=3}");
}

#[test]
fn struct_literal_and_field() {
    assert_eq!(hm("@{ a = 5, b = \"x\" }.a"), "5");
    assert_eq!(flow("@{ a = 5, b = \"x\" }.a"), "5");
}

#[test]
fn missing_field_is_an_error() {
    let a = run_ok("@{ a = 1 }.b");
    assert!(a.hm.starts_with("Missing field b"), "got {}", a.hm);
    assert!(a.errs.iter().any(|e| e.contains("Missing field b")));
}

// ── Let polymorphism ─────────────────────────────────────────

#[test]
fn let_poly_reinstantiates() {
    // f must be fresh at each use: int and string do not collide.
    let a = run_ok("f = { x -> x }; (pair (f 3) (f \"abc\"))");
    assert_eq!(a.hm, "@{0=3, 1=\"abc\"}");
    assert_eq!(a.flow_sig.to_string(), "*@{0=nScalar, 1=nScalar}");
    assert!(a.errs.is_empty());
}

#[test]
fn let_shadows_primitives() {
    assert_eq!(hm("pair = 3; pair"), "3");
}

#[test]
fn recursive_let_is_allowed() {
    // The definition sees its own binding; recursion inside the def is
    // monomorphic, so every exit shares the constant's base var.
    let a = run_ok("f = { x -> (if (eq0 x) 1 (f (dec x))) }; (f 3)");
    assert!(a.errs.is_empty(), "errors: {:?}", a.errs);
    assert_eq!(a.hm, "1");
    assert_eq!(a.flow_sig.to_string(), "1");
}

// ── The if rule ──────────────────────────────────────────────

#[test]
fn if_known_true_takes_one_arm() {
    assert_eq!(hm("(if 1 2 3)"), "2");
    assert_eq!(flow("(if 1 2 3)"), "2");
}

#[test]
fn if_known_false_takes_the_other() {
    assert_eq!(hm("(if 0 2 3)"), "3");
    assert_eq!(flow("(if 0 2 3)"), "3");
}

#[test]
fn if_narrows_a_nilable() {
    // (if x x 0): the then-arm sees the not-nil view of x, the else arm
    // re-introduces nil, so argument and result share one nilable var.
    let a = run_ok("{ x -> (if x x 0) }");
    assert_eq!(a.hm, "{ A? -> A? }");
    assert_eq!(a.flow_sig.to_string(), "[5]{ 1 -> Scalar }");
}

#[test]
fn if_guards_a_field_load() {
    // The synthesized guard strips nil off p before the load; the record
    // stays open and keeps its nil only on the argument side.
    let a = run_ok("{ p -> (if p p.x 0) }");
    assert_eq!(a.hm, "{ @{x=A:B?, ...}? -> A }");
    assert!(a.errs.is_empty(), "errors: {:?}", a.errs);
}

// ── Primitive transfer functions ─────────────────────────────

#[test]
fn arith_folds_constants() {
    assert_eq!(flow("(* 3 4)"), "12");
    assert_eq!(flow("(+ 3 4)"), "7");
    assert_eq!(flow("(dec 5)"), "4");
    assert_eq!(flow("(* 0 5)"), "0");
}

#[test]
fn arith_types_as_int() {
    assert_eq!(hm("(* 3 4)"), "int64");
    assert_eq!(hm("(dec 5)"), "int64");
}

#[test]
fn str_of_constant() {
    assert_eq!(flow("(str 12)"), "\"12\"");
    assert_eq!(hm("(str 12)"), "str");
}

#[test]
fn factor_stays_float() {
    assert_eq!(flow("(factor 1.2)"), "flt64");
    assert_eq!(hm("(factor 1.2)"), "flt64");
}

#[test]
fn eq0_on_constants() {
    assert_eq!(flow("(eq0 0)"), "1");
    assert_eq!(flow("(eq0 5)"), "0");
}

#[test]
fn eq_on_constants() {
    assert_eq!(flow("(eq 3 3)"), "1");
    assert_eq!(flow("(eq 3 4)"), "int1");
}

#[test]
fn isempty_on_constants() {
    assert_eq!(flow("(isempty \"\")"), "1");
    assert_eq!(flow("(isempty \"abc\")"), "0");
}

// ── The apply lift ───────────────────────────────────────────

#[test]
fn lift_keeps_map_results_sharp() {
    // Every call to the inner function meets at its formal, but the HM
    // structure keeps the result typed per shape: ints survive.
    let a = run_ok(
        "map = { f xs -> (pair (f xs.0) (f xs.1)) }; \
         (map { q -> (pair q 1) } (pair 2 3))",
    );
    assert_eq!(a.hm, "@{0=A:@{0=int8, 1=1}, 1=A}");
    let s = a.flow_sig.to_string();
    assert!(s.contains("int8"), "flow lost the ints: {}", s);
    assert!(s.contains("1=1"), "flow lost the constant: {}", s);
    assert!(!s.contains("Scalar"), "flow degraded to Scalar: {}", s);
}

// ── Enable flags ─────────────────────────────────────────────

#[test]
fn hm_only_run() {
    let opts = Opts {
        do_gcp: false,
        ..Opts::default()
    };
    let a = crate::run_with("{ x -> (if x x 0) }", opts).unwrap();
    assert_eq!(a.hm, "{ A? -> A? }");
}

#[test]
fn gcp_only_run() {
    let opts = Opts {
        do_hm: false,
        do_lift: false,
        ..Opts::default()
    };
    let a = crate::run_with("(pair 3 \"abc\")", opts).unwrap();
    assert_eq!(a.flow_sig.to_string(), "*@{0=3, 1=\"abc\"}");
}

// ── Confluence ───────────────────────────────────────────────

#[test]
fn worklist_order_does_not_change_answers() {
    let progs = [
        "f = { x -> x }; (pair (f 3) (f \"abc\"))",
        "{ x -> (if x x 0) }",
        "map = { f xs -> (pair (f xs.0) (f xs.1)) }; \
         (map { q -> (pair q 1) } (pair 2 3))",
    ];
    for prog in progs {
        let base = run_ok(prog);
        for seed in [1, 7, 42, 1234] {
            let opts = Opts {
                seed,
                ..Opts::default()
            };
            let a = crate::run_with(prog, opts).unwrap();
            assert_eq!(a.hm, base.hm, "hm diverged for {:?} seed {}", prog, seed);
            assert_eq!(
                a.flow_sig, base.flow_sig,
                "flow diverged for {:?} seed {}",
                prog, seed
            );
        }
    }
}

// ── Open-question pins: notnil vs field addition ─────────────

#[test]
fn notnil_commutes_with_field_add_guarded_load() {
    // Field added after the guard: still no nil error, record stays open.
    let a = run_ok("{ p -> (if p p.x 0) }");
    assert!(a.errs.is_empty(), "errors: {:?}", a.errs);
    assert!(a.hm.contains("@{x="), "got {}", a.hm);
}

#[test]
fn notnil_commutes_with_field_add_two_loads() {
    // Two fields arrive at different times on both sides of the guard.
    let a = run_ok("{ p -> (if p (pair p.x p.y) 0) }");
    assert!(a.errs.is_empty(), "errors: {:?}", a.errs);
    assert!(a.hm.contains("x="), "got {}", a.hm);
    assert!(a.hm.contains("y="), "got {}", a.hm);
}

// ── Memory summary ───────────────────────────────────────────

#[test]
fn final_memory_records_allocations() {
    let a = run_ok("(pair 1 2)");
    let m = a.mem.to_string();
    assert!(m.contains("@{0=1, 1=2}"), "got {}", m);

    let a = run_ok("@{ a = 5 }");
    let m = a.mem.to_string();
    assert!(m.contains("@{a=5}"), "got {}", m);
}

// ── Front-end failures ───────────────────────────────────────

#[test]
fn undefined_identifier_errors() {
    assert!(matches!(
        crate::run("x"),
        Err(crate::RunError::Undefined { .. })
    ));
}

#[test]
fn parse_errors_surface() {
    assert!(matches!(
        crate::run("(pair 1"),
        Err(crate::RunError::Parse(_))
    ));
}
