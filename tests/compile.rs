//! End-to-end tests against the public `cc7::compile` entry point. These
//! assert on the text of the emitted assembly listing; nothing here invokes
//! an assembler or linker.

use std::io::{Read, Write};

fn compiled(source: &str) -> String {
    cc7::compile(source).unwrap_or_else(|e| panic!("unexpected compile error: {e}"))
}

#[test]
fn arithmetic_with_precedence() {
    let asm = compiled("int main(){ return 1+2*3; }");
    assert!(asm.contains(".global main"));
    assert!(asm.contains("  imul rax, rdi"));
    assert!(asm.contains("  add rax, rdi"));
    assert!(asm.contains("  ret"));
}

#[test]
fn local_variable_assignment() {
    let asm = compiled("int main(){ int a; a=3; return a*a-1; }");
    assert!(asm.contains("  mov rax, rbp"));
    assert!(asm.contains("  sub rax, 8"));
    assert!(asm.contains("  imul rax, rdi"));
    assert!(asm.contains("  sub rax, rdi"));
}

#[test]
fn function_call_with_arguments() {
    let asm = compiled("int add(int a,int b){ return a+b; } int main(){ return add(3,4); }");
    assert!(asm.contains(".global add"));
    assert!(asm.contains(".global main"));
    assert!(asm.contains("  call add"));
    assert!(asm.contains("  and rax, 15"));
    assert!(asm.contains("  pop rsi"));
    assert!(asm.contains("  pop rdi"));
}

#[test]
fn pointer_store_through_address_of() {
    let asm = compiled("int main(){ int x; int *p; p=&x; *p=42; return x; }");
    // &x computes x's address without loading through it
    assert!(asm.contains("  mov rax, rbp"));
    assert!(asm.contains("  mov [rax], rdi"));
}

#[test]
fn array_indexing_decays_to_pointer_arithmetic() {
    let asm = compiled(
        "int main(){ int a[3]; *a=1; *(a+1)=2; *(a+2)=4; return *a + *(a+1) + *(a+2); }",
    );
    assert!(asm.contains("  imul rdi, 8"));
    assert!(asm.contains("  sub rsp, 32"));
}

#[test]
fn for_loop_accumulates() {
    let asm = compiled("int main(){ int i; int s; s=0; for(i=0;i<5;i=i+1) s=s+i; return s; }");
    assert!(asm.contains(".Lbegin0:"));
    assert!(asm.contains("  setl al"));
    assert!(asm.contains("  jmp .Lbegin0"));
}

#[test]
fn braceless_for_body_balances_the_stack() {
    let asm = compiled("int main(){ int i; int s; s=0; for(i=0;i<5;i=i+1) s=s+i; return s; }");
    // the loop body (`s=s+i`, an Assign) is a bare statement, not a Block,
    // and still must be popped once per iteration
    let body_start = asm.find(".Lbegin0:").unwrap();
    let jump_back = asm.find("  jmp .Lbegin0").unwrap();
    assert!(asm[body_start..jump_back].contains("  pop rax"));
}

#[test]
fn if_else_emits_both_branches() {
    let asm = compiled("int main(){ if(1==1) return 2; else return 9; }");
    assert!(asm.contains("  sete al"));
    assert!(asm.contains(".Lelse0:"));
    assert!(asm.contains(".Lend0:"));
}

#[test]
fn global_variable_gets_data_section_entry() {
    let asm = compiled("int counter; int main(){ counter=1; return counter; }");
    assert!(asm.contains(".data"));
    assert!(asm.contains("counter:"));
    assert!(asm.contains("  .zero 8"));
    assert!(asm.contains("counter[rip]"));
}

#[test]
fn char_parameter_uses_one_byte_register() {
    let asm = compiled("int id(char c){ return c; } int main(){ return id(65); }");
    assert!(asm.contains("  mov [rbp-1], dil"));
}

#[test]
fn sizeof_is_folded_to_a_constant() {
    let asm = compiled("int main(){ return sizeof(1); }");
    assert!(asm.contains("  push 8"));
}

#[test]
fn pointer_difference_divides_by_pointee_size() {
    let asm = compiled(
        "int main(){ int a[3]; int *p; int *q; p=&a[0]; q=&a[2]; return q-p; }",
    );
    assert!(asm.contains("  cqo"));
}

#[test]
fn generated_listing_round_trips_through_a_file() {
    let asm = compiled("int main(){ return 0; }");
    let mut file = tempfile::NamedTempFile::new().expect("failed to create temp file");
    file.write_all(asm.as_bytes()).expect("failed to write listing");
    let mut roundtripped = String::new();
    std::fs::File::open(file.path())
        .expect("failed to reopen temp file")
        .read_to_string(&mut roundtripped)
        .expect("failed to read listing back");
    assert_eq!(roundtripped, asm);
}

#[test]
fn missing_return_expression_is_a_syntax_error() {
    let error = cc7::compile("int main(){ return; }").unwrap_err();
    assert_eq!(error.message, "Expected number token.");
}

#[test]
fn undefined_identifier_is_reported() {
    let error = cc7::compile("int main(){ return x; }").unwrap_err();
    assert_eq!(error.message, "Undefined local variable.");
}

#[test]
fn undefined_function_is_reported() {
    let error = cc7::compile("int main(){ return missing(); }").unwrap_err();
    assert_eq!(error.message, "Undefined function.");
}

#[test]
fn calling_a_plain_variable_is_rejected() {
    let error = cc7::compile("int main(){ int f; return f(1); }").unwrap_err();
    assert_eq!(error.message, "Undefined function.");
}

#[test]
fn redeclaration_in_same_scope_is_rejected() {
    let error = cc7::compile("int main(){ int x; int x; return 0; }").unwrap_err();
    assert_eq!(error.message, "Redeclaration of variable.");
}

#[test]
fn too_many_call_arguments_is_rejected() {
    let error = cc7::compile("int f(int a){ return a; } int main(){ return f(1,2,3,4,5,6,7); }")
        .unwrap_err();
    assert_eq!(error.message, "Too many arguments.");
}

#[test]
fn assigning_to_a_non_lvalue_is_rejected() {
    let error = cc7::compile("int main(){ 1 = 2; return 0; }").unwrap_err();
    assert_eq!(
        error.message,
        "Left value in assignment must be a variable or dereference."
    );
}

#[test]
fn unexpected_character_is_reported_with_offset() {
    let error = cc7::compile("int main(){ return 1 $ 2; }").unwrap_err();
    assert_eq!(error.message, "Unexpected character.");
}
