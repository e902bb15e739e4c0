//! Built-in regression table run by `intcalc --test`.

/// One source program and the value `calc` must return for it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestCase {
    pub source: &'static str,
    pub expected: i32,
}

const fn case(source: &'static str, expected: i32) -> TestCase {
    TestCase { source, expected }
}

pub const TEST_CASES: [TestCase; 17] = [
    case("int32_t value1 = 1 + 2;\n", 3),
    case("int32_t value1 = 1 - 2;\n", -1),
    case("int32_t value1 = 1 * 2;\n", 2),
    case("int32_t value1 = 4 / 2;\n", 2),
    case("int32_t value1 = 1;\nint32_t value2 = value1 + 2;\n", 3),
    case("int32_t value1 = 1;\nint32_t value2 = value1 - 2;\n", -1),
    case("int32_t value1 = 1;\nint32_t value2 = value1 * 2;\n", 2),
    case("int32_t value1 = 4;\nint32_t value2 = value1 / 2;\n", 2),
    case("int32_t value1 = 1;\nint32_t value2 = 2 + value1;\n", 3),
    case("int32_t value1 = 1;\nint32_t value2 = 2 - value1;\n", 1),
    case("int32_t value1 = 1;\nint32_t value2 = 2 * value1;\n", 2),
    case("int32_t value1 = 2;\nint32_t value2 = 4 / value1;\n", 2),
    case(
        "int32_t value1 = 1;\nint32_t value2 = 2;\nint32_t value3 = value1 + value2;\n",
        3,
    ),
    case(
        "int32_t value1 = 1;\nint32_t value2 = 2;\nint32_t value3 = value1 - value2;\n",
        -1,
    ),
    case(
        "int32_t value1 = 1;\nint32_t value2 = 2;\nint32_t value3 = value1 * value2;\n",
        2,
    ),
    case(
        "int32_t value1 = 4;\nint32_t value2 = 2;\nint32_t value3 = value1 / value2;\n",
        2,
    ),
    case(
        "int32_t value1 = (1 + 2) * 3;\nint32_t value2 = 2 + (3 * value1);\nvalue1 = value2 + 100;\n",
        129,
    ),
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_and_resolve;
    use crate::wasm::encode_program;

    #[test]
    fn test_every_case_compiles_to_a_module() {
        for (i, case) in TEST_CASES.iter().enumerate() {
            let program = parse_and_resolve(case.source)
                .unwrap_or_else(|e| panic!("case {}: {}", i + 1, e));
            assert!(program.var_count >= 1);
            encode_program(&program).unwrap();
        }
    }
}
