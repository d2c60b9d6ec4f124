use itertools::Itertools;

use crate::num::{Binary, Compare, Unary};

/// Fixed micro-kernel block for block-granularity loads and stores, usable
/// when the vendor subgroup extension is present.
pub const SUBGROUP_MICROKERNELS: &str = r#"
#pragma OPENCL EXTENSION cl_intel_subgroups : enable

#define vector_load(x) as_float(intel_sub_group_block_read((const global int*) (&(x))))
#define vector_store(x, v) intel_sub_group_block_write((const global int*) (&(x)), as_uint(v))

"#;

/// Manual bit-pattern encode/decode pair, round-to-nearest-even, for targets
/// without native narrow-float storage.
const HALF_FALLBACK: &str = r#"static uint __half_from_float(float a) {
  uint f = as_uint(a);
  uint sign = (f >> 16) & 0x8000u;
  uint mant = f & 0x007fffffu;
  int exp = (int)((f >> 23) & 0xffu);
  if (exp == 255) {
    return sign | 0x7c00u | (mant != 0 ? 0x0200u : 0u);
  }
  exp = exp - 127 + 15;
  if (exp >= 31) {
    return sign | 0x7c00u;
  }
  if (exp <= 0) {
    if (exp < -10) {
      return sign;
    }
    mant |= 0x00800000u;
    uint shift = (uint)(14 - exp);
    uint h = mant >> shift;
    uint rest = mant & ((1u << shift) - 1u);
    uint tie = 1u << (shift - 1u);
    if (rest > tie || (rest == tie && (h & 1u) != 0)) {
      h += 1u;
    }
    return sign | h;
  }
  uint h = ((uint)exp << 10) | (mant >> 13);
  uint rest = mant & 0x1fffu;
  if (rest > 0x1000u || (rest == 0x1000u && (h & 1u) != 0)) {
    h += 1u;
  }
  return sign | h;
}
static float __half_to_float(uint h) {
  uint sign = (h & 0x8000u) << 16;
  int exp = (int)((h >> 10) & 0x1fu);
  uint mant = h & 0x03ffu;
  if (exp == 31) {
    return as_float(sign | 0x7f800000u | (mant << 13));
  }
  if (exp == 0) {
    if (mant == 0) {
      return as_float(sign);
    }
    while ((mant & 0x0400u) == 0) {
      mant <<= 1;
      exp -= 1;
    }
    mant &= 0x03ffu;
    exp += 1;
  }
  return as_float(sign | ((uint)(exp + 112) << 23) | (mant << 13));
}
"#;

/// Render the numeric-emulation preamble: the `custom` type declaration and
/// every operator overload in generated-source form, emitted once per
/// compilation unit.
///
/// The overload bodies are driven from the same [`Binary`]/[`Unary`]/
/// [`Compare`] descriptions as the natively-compiled implementations in
/// [`crate::num`], so the two paths cannot drift apart.
pub fn emulation_preamble(fp16: bool, fp64: bool) -> String {
    let mut code = String::new();
    code += "#define OVERLOADABLE __attribute__((overloadable))\n\n";
    code += "typedef struct {\n";
    code += "  float d;\n";
    code += "} custom;\n";
    code += "#define CUSTOM_MAX as_custom(FLT_MAX)\n";
    code += "#define CUSTOM_MIN as_custom(FLT_MIN)\n";

    // the canonical encode/decode pair; everything below routes through it
    if fp16 {
        code += "static OVERLOADABLE custom as_custom(float a) {\n";
        code += "  custom c;\n";
        code += "  vstore_half(a, 0, (half*)&c.d);\n";
        code += "  return c;\n";
        code += "}\n";
        code += "static OVERLOADABLE float as_float(custom a) {\n";
        code += "  return vload_half(0, (half*)&a.d);\n";
        code += "}\n";
    } else {
        code += HALF_FALLBACK;
        code += "static OVERLOADABLE custom as_custom(float a) {\n";
        code += "  custom c;\n";
        code += "  c.d = as_float(__half_from_float(a));\n";
        code += "  return c;\n";
        code += "}\n";
        code += "static OVERLOADABLE float as_float(custom a) {\n";
        code += "  return __half_to_float(as_uint(a.d));\n";
        code += "}\n";
    }

    code += "static OVERLOADABLE custom as_custom(float a, int b) {\n";
    code += "  return as_custom(a);\n";
    code += "}\n";
    code += "static OVERLOADABLE custom as_custom(int a) {\n";
    code += "  return as_custom((float)a);\n";
    code += "}\n";
    code += "static OVERLOADABLE custom as_custom(long a) {\n";
    code += "  return as_custom((float)a);\n";
    code += "}\n";
    if fp64 {
        code += "static OVERLOADABLE custom as_custom(double a) {\n";
        code += "  return as_custom((float)a);\n";
        code += "}\n";
    }
    code += "static OVERLOADABLE custom as_custom(custom a) {\n";
    code += "  return a;\n";
    code += "}\n";
    code += "static OVERLOADABLE custom as_custom(custom a, int b) {\n";
    code += "  return a;\n";
    code += "}\n";
    code += "static OVERLOADABLE uint as_uint(custom a) {\n";
    code += "  return as_uint(as_float(a));\n";
    code += "}\n";

    for op in Binary::ALL {
        code += &format!(
            "static OVERLOADABLE custom {}(custom a, custom b) {{\n",
            op.name()
        );
        code += &format!(
            "  return as_custom(as_float(a) {} as_float(b));\n",
            op.symbol()
        );
        code += "}\n";
    }
    // multiply by a native float without pre-rounding the right-hand side
    code += "static OVERLOADABLE custom mul(custom a, float b) {\n";
    code += "  return as_custom(as_float(a) * b);\n";
    code += "}\n";

    for op in Unary::ALL {
        let body = match op.callee() {
            Some(callee) => format!("as_custom({callee}(as_float(a)))"),
            None => "as_custom(-as_float(a))".to_string(),
        };
        code += &format!("static OVERLOADABLE custom {}(custom a) {{\n", op.name());
        code += &format!("  return {body};\n");
        code += "}\n";
    }

    for op in Compare::ALL {
        code += &format!(
            "static OVERLOADABLE int {}(custom a, custom b) {{\n",
            op.name()
        );
        code += &format!("  return as_float(a) {} as_float(b);\n", op.symbol());
        code += "}\n";
    }

    code += "static OVERLOADABLE custom select(custom a, custom b, int c) {\n";
    code += "  return as_custom(select(as_float(a), as_float(b), c));\n";
    code += "}\n";
    code += "static OVERLOADABLE custom select(float a, custom b, int c) {\n";
    code += "  return as_custom(select(a, as_float(b), c));\n";
    code += "}\n";

    code
}

/// Number every line of `src` for human-readable diagnostics.
pub fn with_line_numbers(src: &str) -> String {
    src.lines()
        .enumerate()
        .map(|(index, line)| format!("{:5}: {line}", index + 1))
        .join("\n")
}
