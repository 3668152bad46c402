use super::*;
use crate::virtual_machine::assembler::assemble_source;

fn vm_with_args(source: &str, args: &[&str]) -> VM {
    let program = assemble_source(source).expect("assembly failed");
    let ctx = ExecContext::new(args.iter().map(|a| a.to_string()).collect());
    VM::new(program, ctx)
}

fn run_vm_with_args(source: &str, args: &[&str]) -> (VM, String) {
    let mut vm = vm_with_args(source, args);
    let mut out: Vec<u8> = Vec::new();
    vm.run(&mut out).expect("vm run failed");
    (vm, String::from_utf8(out).expect("utf8 output"))
}

fn run_vm(source: &str) -> (VM, String) {
    run_vm_with_args(source, &[])
}

fn run_and_get_reg(source: &str, reg: usize) -> i64 {
    run_vm(source).0.registers()[reg]
}

fn run_expect_err(source: &str) -> VMError {
    let mut vm = vm_with_args(source, &[]);
    vm.run(&mut std::io::sink()).expect_err("expected error")
}

fn run_code(code: Vec<i64>) -> Result<(), VMError> {
    VM::new(Program::new(code), ExecContext::default()).run(&mut std::io::sink())
}

// ==================== Entry point ====================

#[test]
fn without_main_starts_at_zero() {
    let (vm, out) = run_vm("set r0 4\nshow r0");
    assert_eq!(out, "4\n");
    assert!(vm.is_halted());
}

#[test]
fn main_skips_preceding_code() {
    let (_, out) = run_vm("show r0\nmain: set r0 1\nshow r0");
    assert_eq!(out, "1\n");
}

#[test]
fn show_writes_exactly_once() {
    let (_, out) = run_vm("set r0 7\nshow r0\nhalt");
    assert_eq!(out, "7\n");
}

#[test]
fn registers_start_zeroed() {
    let vm = vm_with_args("halt", &[]);
    assert_eq!(vm.registers(), &[0; REGISTER_COUNT]);
    assert!(vm.stack().is_empty());
    assert!(vm.call_stack().is_empty());
    assert_eq!(vm.cmp_flag(), 0);
    assert!(!vm.err_flag());
}

// ==================== Arithmetic ====================

#[test]
fn sub_is_dst_minus_src() {
    assert_eq!(run_and_get_reg("set r0 10\nset r1 3\nsub r0 r1", 1), -7);
}

#[test]
fn arithmetic_ops() {
    assert_eq!(run_and_get_reg("set r0 4\nset r1 6\nadd r0 r1", 1), 10);
    assert_eq!(run_and_get_reg("set r0 4\nset r1 6\nmul r0 r1", 1), 24);
    assert_eq!(run_and_get_reg("set r0 5\nset r1 17\ndiv r0 r1", 1), 3);
    assert_eq!(run_and_get_reg("set r0 5\nset r1 17\nrem r0 r1", 1), 2);
    assert_eq!(run_and_get_reg("set r0 -5\nset r1 17\nrem r0 r1", 1), 2);
    assert_eq!(run_and_get_reg("set r0 9\nmov r0 r3", 3), 9);
    assert_eq!(run_and_get_reg("inc r2\ninc r2\ndec r2\ninc r2", 2), 2);
}

#[test]
fn arithmetic_wraps() {
    assert_eq!(
        run_and_get_reg("set r0 9223372036854775807\ninc r0", 0),
        i64::MIN
    );
    assert_eq!(
        run_and_get_reg("set r0 -9223372036854775808\ndec r0", 0),
        i64::MAX
    );
    assert_eq!(
        run_and_get_reg("set r1 -1\nset r0 -9223372036854775808\ndiv r1 r0", 0),
        i64::MIN
    );
}

#[test]
fn division_by_zero_faults() {
    // set r0 1 occupies 2..5, div sits at 5
    assert!(matches!(
        run_expect_err("set r0 1\ndiv r1 r0"),
        VMError::DivisionByZero { ip: 5 }
    ));
    assert!(matches!(
        run_expect_err("set r0 1\nrem r1 r0"),
        VMError::DivisionByZero { .. }
    ));
}

// ==================== Comparison and jumps ====================

#[test]
fn cmp_equal_takes_jeq() {
    let source = "set r0 5\nset r1 5\ncmp r0 r1\njeq yes\nset r2 1\nhalt\nyes: set r2 2";
    assert_eq!(run_and_get_reg(source, 2), 2);
}

#[test]
fn cmp_unequal_falls_through_jeq() {
    let source = "set r0 5\nset r1 6\ncmp r0 r1\njeq yes\nset r2 1\nhalt\nyes: set r2 2";
    let (vm, _) = run_vm(source);
    assert_eq!(vm.registers()[2], 1);
    assert_eq!(vm.cmp_flag(), 1);
}

#[test]
fn conditional_jumps_test_sign() {
    // flag = r1 - r0 = -1
    let prelude = "set r0 2\nset r1 1\ncmp r0 r1\n";
    for (jump, taken) in [
        ("jeq", false),
        ("jne", true),
        ("jgt", false),
        ("jlt", true),
        ("jge", false),
        ("jle", true),
    ] {
        let source = format!("{prelude}{jump} yes\nset r5 1\nhalt\nyes: set r5 2");
        let expected = if taken { 2 } else { 1 };
        assert_eq!(run_and_get_reg(&source, 5), expected, "{jump}");
    }
}

#[test]
fn counting_loop() {
    let source = "\
main:
    set r1 5
.loop:
    inc r0
    cmp r0 r1
    jgt .loop
    show r0
";
    let (_, out) = run_vm(source);
    assert_eq!(out, "5\n");
}

#[test]
fn jump_past_end_halts() {
    let (vm, out) = run_vm("jmp 1000\nset r0 1\nshow r0");
    assert!(out.is_empty());
    assert!(vm.is_halted());
}

#[test]
fn negative_jump_target_faults() {
    let err = run_code(vec![Instruction::Jmp.opcode(), -4]).unwrap_err();
    assert!(matches!(
        err,
        VMError::InvalidJumpTarget { target: -4, ip: 0 }
    ));
}

// ==================== Stacks ====================

#[test]
fn push_pop_roundtrip() {
    let source = "set r0 1\nset r1 2\npush r0\npush r1\npop r2\npop r3";
    let (vm, _) = run_vm(source);
    assert_eq!(vm.registers()[2], 2);
    assert_eq!(vm.registers()[3], 1);
    assert!(vm.stack().is_empty());
}

#[test]
fn pop_more_than_pushed_faults() {
    assert!(matches!(
        run_expect_err("push r0\npop r0\npop r0"),
        VMError::StackUnderflow
    ));
}

#[test]
fn stack_overflow_faults() {
    let program = assemble_source("push r0\npush r0\npush r0").unwrap();
    let config = MachineConfig {
        stack_size: 2,
        ..MachineConfig::default()
    };
    let mut vm = VM::with_config(program, ExecContext::default(), &config);
    let err = vm.run(&mut std::io::sink()).unwrap_err();
    assert!(matches!(err, VMError::StackOverflow { capacity: 2 }));
    assert_eq!(vm.stack().len(), 2);
}

#[test]
fn call_and_ret() {
    let source = "\
main:
    call fn
    show r0
    halt
fn:
    set r0 9
    ret
";
    let (vm, out) = run_vm(source);
    assert_eq!(out, "9\n");
    assert!(vm.call_stack().is_empty());
}

#[test]
fn call_pushes_position_after_operand() {
    let mut vm = vm_with_args("main: call fn\nhalt\nfn: ret", &[]);
    let mut out: Vec<u8> = Vec::new();
    assert_eq!(vm.step(&mut out).unwrap(), VMStatus::Running); // jmp main
    assert_eq!(vm.step(&mut out).unwrap(), VMStatus::Running); // call fn
    assert_eq!(vm.call_stack(), &[4]);
    assert_eq!(vm.ip(), 5);
    vm.step(&mut out).unwrap(); // ret
    assert_eq!(vm.ip(), 4);
}

#[test]
fn ret_with_empty_call_stack_faults() {
    assert!(matches!(
        run_expect_err("ret"),
        VMError::CallStackUnderflow
    ));
}

#[test]
fn unbounded_recursion_overflows_call_stack() {
    assert!(matches!(
        run_expect_err("main: call main"),
        VMError::CallStackOverflow {
            capacity: CALL_STACK_SIZE
        }
    ));
}

// ==================== Arguments ====================

#[test]
fn iarg_pushes_parsed_argument() {
    let (vm, _) = run_vm_with_args("set r0 1\niarg r0\npop r1", &["x", "-42"]);
    assert_eq!(vm.registers()[1], -42);
    assert!(!vm.err_flag());
}

#[test]
fn iarg_out_of_range_sets_error_flag() {
    let (vm, _) = run_vm_with_args("set r0 3\niarg r0", &["1"]);
    assert!(vm.err_flag());
    assert!(vm.stack().is_empty());

    let (vm, _) = run_vm_with_args("set r0 -1\niarg r0", &["1"]);
    assert!(vm.err_flag());
}

#[test]
fn iarg_non_integer_sets_error_flag() {
    let (vm, _) = run_vm_with_args("iarg r0", &["seven"]);
    assert!(vm.err_flag());
    assert!(vm.stack().is_empty());
}

#[test]
fn jerr_jumps_and_clears() {
    let source = "set r0 3\niarg r0\njerr bad\nset r1 1\nhalt\nbad: set r1 2";
    let (vm, _) = run_vm_with_args(source, &["1"]);
    assert_eq!(vm.registers()[1], 2);
    assert!(!vm.err_flag());
}

#[test]
fn jerr_without_error_falls_through() {
    let source = "jerr bad\nset r1 1\nhalt\nbad: set r1 2";
    assert_eq!(run_and_get_reg(source, 1), 1);
}

// ==================== Faults ====================

#[test]
fn invalid_opcode() {
    let err = run_code(vec![Instruction::Noop.opcode(), 99]).unwrap_err();
    assert!(matches!(
        err,
        VMError::InvalidInstruction {
            opcode: 99,
            offset: 1
        }
    ));
}

#[test]
fn truncated_instruction() {
    let err = run_code(vec![Instruction::Const.opcode(), 5]).unwrap_err();
    assert!(matches!(
        err,
        VMError::UnexpectedEndOfBytecode { ip: 2, .. }
    ));
}

#[test]
fn register_out_of_range() {
    assert!(matches!(
        run_expect_err("inc r16"),
        VMError::InvalidRegisterIndex {
            index: 16,
            available: REGISTER_COUNT
        }
    ));
}

#[test]
fn output_before_fault_is_kept() {
    let mut vm = vm_with_args("set r0 1\nshow r0\npop r1", &[]);
    let mut out: Vec<u8> = Vec::new();
    assert!(matches!(vm.run(&mut out), Err(VMError::StackUnderflow)));
    assert_eq!(out, b"1\n");
}

#[test]
fn step_on_halted_machine_is_noop() {
    let (mut vm, _) = run_vm("halt");
    let ip = vm.ip();
    assert_eq!(vm.step(&mut std::io::sink()).unwrap(), VMStatus::Halted);
    assert_eq!(vm.ip(), ip);
}

#[test]
fn current_instruction_renders_at_ip() {
    let vm = vm_with_args("main: set r0 7", &[]);
    assert_eq!(vm.current_instruction().unwrap(), "jmp 2");
}
