//! Cranelift implementation of the code-generation contract.
//!
//! Each expression compiles to one function taking the argument-buffer base
//! address and returning a single i64 word. Cranelift handles register
//! allocation and instruction selection for the host ISA.

use std::collections::HashMap;

use cranelift_codegen::Context;
use cranelift_codegen::ir::condcodes::{FloatCC, IntCC};
use cranelift_codegen::ir::types::{F64, I64};
use cranelift_codegen::ir::{AbiParam, InstBuilder, MemFlags, Type, Value};
use cranelift_codegen::settings::{self, Configurable};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{FuncId, Linkage, Module, default_libcall_names};

use super::backend::CodeGen;
use super::ops::{BitOp, CmpOp, FloatClass, FloatUn, MathF1, MathF2, NumOp};
use super::{ArgType, CompileError, CompiledExpr, host, translate};

fn codegen_err(e: impl std::fmt::Display) -> CompileError {
    CompileError::Codegen(e.to_string())
}

/// Compile a bytecode stream into an invocable artifact. Every failure path
/// releases the module memory before returning; nothing leaks on a bad
/// stream.
pub(crate) fn compile(
    opcodes: &[i64],
    arg_types: &[ArgType],
) -> Result<CompiledExpr, CompileError> {
    let mut flags = settings::builder();
    flags.set("opt_level", "speed").map_err(codegen_err)?;
    let isa_builder =
        cranelift_native::builder().map_err(|_| CompileError::BackendUnavailable)?;
    let isa = isa_builder
        .finish(settings::Flags::new(flags))
        .map_err(codegen_err)?;

    let mut jit_builder = JITBuilder::with_isa(isa, default_libcall_names());
    host::register(&mut jit_builder);
    let mut module = JITModule::new(jit_builder);

    match build(&mut module, opcodes, arg_types) {
        Ok((func_id, returns_float)) => {
            let entry = module.get_finalized_function(func_id);
            Ok(CompiledExpr {
                module: Some(module),
                entry,
                arg_types: arg_types.to_vec(),
                returns_float,
                literals: Vec::new(),
            })
        }
        Err(e) => {
            unsafe { module.free_memory() };
            Err(e)
        }
    }
}

fn build(
    module: &mut JITModule,
    opcodes: &[i64],
    arg_types: &[ArgType],
) -> Result<(FuncId, bool), CompileError> {
    let ptr_ty = module.target_config().pointer_type();

    let mut sig = module.make_signature();
    sig.params.push(AbiParam::new(ptr_ty));
    sig.returns.push(AbiParam::new(I64));

    let func_id = module
        .declare_function("sprig_expr", Linkage::Local, &sig)
        .map_err(codegen_err)?;

    let mut ctx = Context::new();
    ctx.func.signature = sig;
    let mut fn_builder_ctx = FunctionBuilderContext::new();

    let returns_float;
    {
        let mut builder = FunctionBuilder::new(&mut ctx.func, &mut fn_builder_ctx);
        let entry_block = builder.create_block();
        builder.append_block_params_for_function_params(entry_block);
        builder.switch_to_block(entry_block);
        builder.seal_block(entry_block);
        let args_base = builder.block_params(entry_block)[0];

        let mut emit = Emit {
            module: &mut *module,
            builder,
            args_base,
            ptr_ty,
            imports: HashMap::new(),
        };
        returns_float = translate(&mut emit, opcodes, arg_types)?;
        emit.builder.finalize();
    }

    module.define_function(func_id, &mut ctx).map_err(codegen_err)?;
    module.finalize_definitions().map_err(codegen_err)?;
    Ok((func_id, returns_float))
}

struct Emit<'a> {
    module: &'a mut JITModule,
    builder: FunctionBuilder<'a>,
    args_base: Value,
    ptr_ty: Type,
    imports: HashMap<&'static str, FuncId>,
}

impl Emit<'_> {
    /// 0/1 comparison flag widened into the i64 channel.
    fn flag(&mut self, cmp: Value) -> Value {
        self.builder.ins().uextend(I64, cmp)
    }

    fn import(
        &mut self,
        name: &'static str,
        params: &[Type],
        ret: Type,
    ) -> Result<FuncId, CompileError> {
        if let Some(&id) = self.imports.get(name) {
            return Ok(id);
        }
        let mut sig = self.module.make_signature();
        for &t in params {
            sig.params.push(AbiParam::new(t));
        }
        sig.returns.push(AbiParam::new(ret));
        let id = self
            .module
            .declare_function(name, Linkage::Import, &sig)
            .map_err(codegen_err)?;
        self.imports.insert(name, id);
        Ok(id)
    }

    fn call(&mut self, id: FuncId, args: &[Value]) -> Value {
        let local = self.module.declare_func_in_func(id, self.builder.func);
        let inst = self.builder.ins().call(local, args);
        self.builder.inst_results(inst)[0]
    }

    /// sdiv/srem trap on a zero divisor and on `i64::MIN / -1`; route both
    /// through a safe divisor and patch the result instead.
    fn guarded_div(&mut self, op: NumOp, a: Value, b: Value) -> Value {
        let zero = self.builder.ins().iconst(I64, 0);
        let one = self.builder.ins().iconst(I64, 1);
        let is_zero = self.builder.ins().icmp(IntCC::Equal, b, zero);
        let min = self.builder.ins().iconst(I64, i64::MIN);
        let neg_one = self.builder.ins().iconst(I64, -1);
        let lhs_min = self.builder.ins().icmp(IntCC::Equal, a, min);
        let rhs_neg_one = self.builder.ins().icmp(IntCC::Equal, b, neg_one);
        let overflow = self.builder.ins().band(lhs_min, rhs_neg_one);
        let bad = self.builder.ins().bor(is_zero, overflow);
        let divisor = self.builder.ins().select(bad, one, b);
        match op {
            NumOp::Div => {
                let q = self.builder.ins().sdiv(a, divisor);
                // i64::MIN / -1 wraps to i64::MIN; division by zero is 0.
                let q = self.builder.ins().select(overflow, a, q);
                self.builder.ins().select(is_zero, zero, q)
            }
            _ => {
                let r = self.builder.ins().srem(a, divisor);
                self.builder.ins().select(bad, zero, r)
            }
        }
    }
}

impl CodeGen for Emit<'_> {
    type Value = Value;

    fn const_int(&mut self, v: i64) -> Value {
        self.builder.ins().iconst(I64, v)
    }

    fn const_float(&mut self, v: f64) -> Value {
        self.builder.ins().f64const(v)
    }

    fn const_ptr(&mut self, bits: i64) -> Value {
        self.builder.ins().iconst(self.ptr_ty, bits)
    }

    fn load_arg(&mut self, ordinal: usize, ty: ArgType) -> Value {
        let offset = (ordinal * 8) as i32;
        let loaded = match ty {
            ArgType::Float => F64,
            ArgType::Str => self.ptr_ty,
            ArgType::Bool | ArgType::Int => I64,
        };
        self.builder
            .ins()
            .load(loaded, MemFlags::trusted(), self.args_base, offset)
    }

    fn int_to_float(&mut self, v: Value) -> Value {
        self.builder.ins().fcvt_from_sint(F64, v)
    }

    fn float_to_int(&mut self, v: Value) -> Value {
        self.builder.ins().fcvt_to_sint_sat(I64, v)
    }

    fn float_bits(&mut self, v: Value) -> Value {
        self.builder.ins().bitcast(I64, MemFlags::new(), v)
    }

    fn int_num(&mut self, op: NumOp, a: Value, b: Value) -> Value {
        match op {
            NumOp::Add => self.builder.ins().iadd(a, b),
            NumOp::Sub => self.builder.ins().isub(a, b),
            NumOp::Mul => self.builder.ins().imul(a, b),
            NumOp::Div | NumOp::Rem => self.guarded_div(op, a, b),
            NumOp::Min => self.builder.ins().smin(a, b),
            NumOp::Max => self.builder.ins().smax(a, b),
        }
    }

    fn float_num(&mut self, op: NumOp, a: Value, b: Value) -> Value {
        match op {
            NumOp::Add => self.builder.ins().fadd(a, b),
            NumOp::Sub => self.builder.ins().fsub(a, b),
            NumOp::Mul => self.builder.ins().fmul(a, b),
            NumOp::Div => self.builder.ins().fdiv(a, b),
            NumOp::Min => self.builder.ins().fmin(a, b),
            NumOp::Max => self.builder.ins().fmax(a, b),
            NumOp::Rem => unreachable!("float remainder is a host call"),
        }
    }

    fn bit(&mut self, op: BitOp, a: Value, b: Value) -> Value {
        match op {
            BitOp::And => self.builder.ins().band(a, b),
            BitOp::Or => self.builder.ins().bor(a, b),
            BitOp::Xor => self.builder.ins().bxor(a, b),
            BitOp::Shl => self.builder.ins().ishl(a, b),
            BitOp::Shr => self.builder.ins().sshr(a, b),
            BitOp::Ushr => self.builder.ins().ushr(a, b),
        }
    }

    fn int_neg(&mut self, v: Value) -> Value {
        self.builder.ins().ineg(v)
    }

    fn int_not(&mut self, v: Value) -> Value {
        self.builder.ins().bnot(v)
    }

    fn int_abs(&mut self, v: Value) -> Value {
        self.builder.ins().iabs(v)
    }

    fn float_neg(&mut self, v: Value) -> Value {
        self.builder.ins().fneg(v)
    }

    fn float_abs(&mut self, v: Value) -> Value {
        self.builder.ins().fabs(v)
    }

    fn float_un(&mut self, op: FloatUn, v: Value) -> Value {
        match op {
            FloatUn::Ceil => self.builder.ins().ceil(v),
            FloatUn::Floor => self.builder.ins().floor(v),
            FloatUn::Trunc => self.builder.ins().trunc(v),
            FloatUn::Rint => self.builder.ins().nearest(v),
            FloatUn::Sqrt => self.builder.ins().sqrt(v),
        }
    }

    fn int_cmp(&mut self, op: CmpOp, a: Value, b: Value) -> Value {
        let cc = match op {
            CmpOp::Lt => IntCC::SignedLessThan,
            CmpOp::Le => IntCC::SignedLessThanOrEqual,
            CmpOp::Gt => IntCC::SignedGreaterThan,
            CmpOp::Ge => IntCC::SignedGreaterThanOrEqual,
        };
        let cmp = self.builder.ins().icmp(cc, a, b);
        self.flag(cmp)
    }

    fn float_cmp(&mut self, op: CmpOp, a: Value, b: Value) -> Value {
        let cc = match op {
            CmpOp::Lt => FloatCC::LessThan,
            CmpOp::Le => FloatCC::LessThanOrEqual,
            CmpOp::Gt => FloatCC::GreaterThan,
            CmpOp::Ge => FloatCC::GreaterThanOrEqual,
        };
        let cmp = self.builder.ins().fcmp(cc, a, b);
        self.flag(cmp)
    }

    fn int_eq(&mut self, negate: bool, a: Value, b: Value) -> Value {
        let cc = if negate { IntCC::NotEqual } else { IntCC::Equal };
        let cmp = self.builder.ins().icmp(cc, a, b);
        self.flag(cmp)
    }

    fn float_eq(&mut self, negate: bool, a: Value, b: Value) -> Value {
        let cc = if negate { FloatCC::NotEqual } else { FloatCC::Equal };
        let cmp = self.builder.ins().fcmp(cc, a, b);
        self.flag(cmp)
    }

    fn int_cmp3(&mut self, a: Value, b: Value) -> Value {
        let gt = self.builder.ins().icmp(IntCC::SignedGreaterThan, a, b);
        let lt = self.builder.ins().icmp(IntCC::SignedLessThan, a, b);
        let gt = self.flag(gt);
        let lt = self.flag(lt);
        self.builder.ins().isub(gt, lt)
    }

    fn float_cmp3(&mut self, nan: i64, a: Value, b: Value) -> Value {
        let gt = self.builder.ins().fcmp(FloatCC::GreaterThan, a, b);
        let lt = self.builder.ins().fcmp(FloatCC::LessThan, a, b);
        let gt = self.flag(gt);
        let lt = self.flag(lt);
        let ordered = self.builder.ins().isub(gt, lt);
        let unordered = self.builder.ins().fcmp(FloatCC::Unordered, a, b);
        let nan_value = self.builder.ins().iconst(I64, nan);
        self.builder.ins().select(unordered, nan_value, ordered)
    }

    fn int_to_bool(&mut self, negate: bool, v: Value) -> Value {
        let cc = if negate { IntCC::Equal } else { IntCC::NotEqual };
        let cmp = self.builder.ins().icmp_imm(cc, v, 0);
        self.flag(cmp)
    }

    fn float_to_bool(&mut self, negate: bool, v: Value) -> Value {
        let cc = if negate { FloatCC::Equal } else { FloatCC::NotEqual };
        let zero = self.builder.ins().f64const(0.0);
        let cmp = self.builder.ins().fcmp(cc, v, zero);
        self.flag(cmp)
    }

    fn float_class(&mut self, class: FloatClass, v: Value) -> Value {
        let cmp = match class {
            FloatClass::Nan => self.builder.ins().fcmp(FloatCC::Unordered, v, v),
            FloatClass::Inf => {
                let mag = self.builder.ins().fabs(v);
                let inf = self.builder.ins().f64const(f64::INFINITY);
                self.builder.ins().fcmp(FloatCC::Equal, mag, inf)
            }
            FloatClass::Finite => {
                let mag = self.builder.ins().fabs(v);
                let inf = self.builder.ins().f64const(f64::INFINITY);
                self.builder.ins().fcmp(FloatCC::LessThan, mag, inf)
            }
        };
        self.flag(cmp)
    }

    fn math1(&mut self, f: MathF1, v: Value) -> Result<Value, CompileError> {
        let id = self.import(f.symbol(), &[F64], F64)?;
        Ok(self.call(id, &[v]))
    }

    fn math2(&mut self, f: MathF2, a: Value, b: Value) -> Result<Value, CompileError> {
        let id = self.import(f.symbol(), &[F64, F64], F64)?;
        Ok(self.call(id, &[a, b]))
    }

    fn str_len(&mut self, s: Value) -> Result<Value, CompileError> {
        let id = self.import(host::STR_LEN, &[self.ptr_ty], I64)?;
        Ok(self.call(id, &[s]))
    }

    fn str_eq(&mut self, negate: bool, a: Value, b: Value) -> Result<Value, CompileError> {
        let id = self.import(host::STR_EQ, &[self.ptr_ty, self.ptr_ty], I64)?;
        let eq = self.call(id, &[a, b]);
        if negate {
            let cmp = self.builder.ins().icmp_imm(IntCC::Equal, eq, 0);
            Ok(self.flag(cmp))
        } else {
            Ok(eq)
        }
    }

    fn str_index(&mut self, haystack: Value, needle: Value) -> Result<Value, CompileError> {
        let id = self.import(host::STR_INDEX, &[self.ptr_ty, self.ptr_ty], I64)?;
        Ok(self.call(id, &[haystack, needle]))
    }

    fn ret(&mut self, v: Value) {
        self.builder.ins().return_(&[v]);
    }
}
