/*
    MIT License

    Copyright (c) 2020 Lars Krueger <lars_e_krueger@gmx.de>

    Permission is hereby granted, free of charge, to any person obtaining a copy
    of this software and associated documentation files (the "Software"), to deal
    in the Software without restriction, including without limitation the rights
    to use, copy, modify, merge, publish, distribute, sublicense, and/or sell
    copies of the Software, and to permit persons to whom the Software is
    furnished to do so, subject to the following conditions:

    The above copyright notice and this permission notice shall be included in all
    copies or substantial portions of the Software.

    THE SOFTWARE IS PROVIDED "AS IS", WITHOUT WARRANTY OF ANY KIND, EXPRESS OR
    IMPLIED, INCLUDING BUT NOT LIMITED TO THE WARRANTIES OF MERCHANTABILITY,
    FITNESS FOR A PARTICULAR PURPOSE AND NONINFRINGEMENT. IN NO EVENT SHALL THE
    AUTHORS OR COPYRIGHT HOLDERS BE LIABLE FOR ANY CLAIM, DAMAGES OR OTHER
    LIABILITY, WHETHER IN AN ACTION OF CONTRACT, TORT OR OTHERWISE, ARISING FROM,
    OUT OF OR IN CONNECTION WITH THE SOFTWARE OR THE USE OR OTHER DEALINGS IN THE
    SOFTWARE.
*/

//! Symbol tables of the code generator.

/// Base of a variable type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BaseType {
    Void,
    Class,
    Enum,
    Char,
    Short,
    Int,
    Long,
    Float,
    Double,
}

/// A resolved variable type. `class_index` points into the class table and is
/// only meaningful when the base is `Class`; it is 0 otherwise. `array_depth`
/// counts the trailing `[]` specifiers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VarType {
    pub base: BaseType,
    pub class_index: usize,
    pub array_depth: usize,
}

impl VarType {
    pub fn new(base: BaseType) -> Self {
        Self {
            base,
            class_index: 0,
            array_depth: 0,
        }
    }

    /// The C spelling of the type. Every array level becomes one pointer
    /// level.
    pub fn to_c(&self, classes: &[ClassInfo]) -> String {
        let base = match self.base {
            BaseType::Void => "void".to_string(),
            BaseType::Char => "char".to_string(),
            BaseType::Short => "short".to_string(),
            BaseType::Int => "int32_t".to_string(),
            BaseType::Long => "int64_t".to_string(),
            BaseType::Float => "float".to_string(),
            BaseType::Double => "double".to_string(),
            BaseType::Class => format!("struct {}", classes[self.class_index].name),
            BaseType::Enum => "enum".to_string(),
        };
        let mut out = base;
        for _ in 0..self.array_depth {
            out.push('*');
        }
        out
    }
}

/// One declared variable, member, or parameter.
#[derive(Debug, Clone)]
pub struct VariableInfo {
    pub name: String,
    pub var_type: VarType,
    pub is_static: bool,
}

/// One declared or defined function.
#[derive(Debug, Clone)]
pub struct FunctionInfo {
    pub name: String,
    pub parameters: Vec<VariableInfo>,
    pub return_type: VarType,
    pub is_static: bool,

    /// Whether a body has been seen for this function.
    pub defined: bool,
}

/// One forward-declared or defined class.
#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub name: String,
    pub members: Vec<VariableInfo>,

    /// Whether the class body has been seen.
    pub defined: bool,
}

/// One lexical scope. Ids are handed out in increasing order per translation
/// and never reused.
#[derive(Debug)]
pub struct Scope {
    pub id: u32,
    pub variables: Vec<VariableInfo>,
}

/// Two signatures are equal iff the return types are equal and the parameter
/// lists have the same length with equal types at every index. Parameter
/// names do not matter.
pub fn same_signature(a: &FunctionInfo, b: &FunctionInfo) -> bool {
    a.return_type == b.return_type
        && a.parameters.len() == b.parameters.len()
        && a.parameters
            .iter()
            .zip(b.parameters.iter())
            .all(|(x, y)| x.var_type == y.var_type)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(name: &str, base: BaseType, array_depth: usize) -> VariableInfo {
        VariableInfo {
            name: name.to_string(),
            var_type: VarType {
                base,
                class_index: 0,
                array_depth,
            },
            is_static: false,
        }
    }

    fn function(name: &str, ret: BaseType, params: Vec<VariableInfo>) -> FunctionInfo {
        FunctionInfo {
            name: name.to_string(),
            parameters: params,
            return_type: VarType::new(ret),
            is_static: false,
            defined: false,
        }
    }

    #[test]
    fn type_lowering() {
        let classes = vec![ClassInfo {
            name: "Point".to_string(),
            members: Vec::new(),
            defined: true,
        }];
        assert_eq!(VarType::new(BaseType::Int).to_c(&classes), "int32_t");
        assert_eq!(VarType::new(BaseType::Long).to_c(&classes), "int64_t");
        assert_eq!(VarType::new(BaseType::Void).to_c(&classes), "void");
        let int_matrix = VarType {
            base: BaseType::Int,
            class_index: 0,
            array_depth: 2,
        };
        assert_eq!(int_matrix.to_c(&classes), "int32_t**");
        let chars = VarType {
            base: BaseType::Char,
            class_index: 0,
            array_depth: 1,
        };
        assert_eq!(chars.to_c(&classes), "char*");
        let point = VarType {
            base: BaseType::Class,
            class_index: 0,
            array_depth: 0,
        };
        assert_eq!(point.to_c(&classes), "struct Point");
    }

    #[test]
    fn signature_equality_is_reflexive_symmetric_and_transitive() {
        let f = function(
            "f",
            BaseType::Int,
            vec![var("a", BaseType::Int, 0), var("b", BaseType::Char, 1)],
        );
        // Same shape under different names and parameter names.
        let g = function(
            "g",
            BaseType::Int,
            vec![var("x", BaseType::Int, 0), var("y", BaseType::Char, 1)],
        );
        let h = function(
            "h",
            BaseType::Int,
            vec![var("p", BaseType::Int, 0), var("q", BaseType::Char, 1)],
        );
        assert!(same_signature(&f, &f));
        assert!(same_signature(&f, &g));
        assert!(same_signature(&g, &f));
        assert!(same_signature(&g, &h));
        assert!(same_signature(&f, &h));
    }

    #[test]
    fn signature_differences_are_detected() {
        let base = function("f", BaseType::Int, vec![var("a", BaseType::Int, 0)]);
        let other_return = function("f", BaseType::Long, vec![var("a", BaseType::Int, 0)]);
        let other_arity = function("f", BaseType::Int, Vec::new());
        let other_param = function("f", BaseType::Int, vec![var("a", BaseType::Int, 1)]);
        assert!(!same_signature(&base, &other_return));
        assert!(!same_signature(&base, &other_arity));
        assert!(!same_signature(&base, &other_param));
    }
}
