// Line grammars of the calibration table, written with nom
//
//   data line    <name> <threshold> <min> <max>
//   weight line  <name> <count> <v1> ... <v_count>
//   comment      # ...

use nom::bytes::complete::{take_till1, take_while1};
use nom::character::complete::{digit1, space0, space1};
use nom::combinator::{eof, map, map_res, verify};
use nom::multi::count;
use nom::sequence::{pair, preceded, terminated, tuple};
use nom::IResult;

/// A line that has the shape of a data line; the numeric tokens are not
/// converted yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataLine<'a> {
    pub name: &'a str,
    pub threshold: &'a str,
    pub min: &'a str,
    pub max: &'a str,
}

/// Extracted `<name> <threshold> <min> <max>` fields.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecordFields<'a> {
    pub name: &'a str,
    pub threshold: f64,
    pub min: f64,
    pub max: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeightLine<'a> {
    pub name: &'a str,
    pub scales: Vec<f64>,
}

pub fn is_comment(line: &str) -> bool {
    line.starts_with('#')
}

fn name(input: &str) -> IResult<&str, &str> {
    take_till1(|c: char| c.is_whitespace())(input)
}

fn is_float_char(c: char) -> bool {
    c.is_ascii_digit() || matches!(c, '+' | '-' | '.' | 'e' | 'E')
}

/// Digits, sign, decimal point and exponent marker only.
fn float_like(input: &str) -> IResult<&str, &str> {
    take_while1(is_float_char)(input)
}

/// A whole whitespace-delimited token made of float characters that
/// converts to a finite `f64`. `nan`, `inf` and overflowing exponents fail.
fn number(input: &str) -> IResult<&str, f64> {
    let token = verify(take_till1(|c: char| c.is_whitespace()), |s: &str| {
        s.chars().all(is_float_char)
    });
    verify(map_res(token, |s: &str| s.parse::<f64>()), |v: &f64| {
        v.is_finite()
    })(input)
}

/// Matches the whole line against `\S+ float float float`, tolerating
/// trailing blanks.
pub fn data_line(input: &str) -> IResult<&str, DataLine<'_>> {
    map(
        terminated(
            tuple((
                name,
                preceded(space1, float_like),
                preceded(space1, float_like),
                preceded(space1, float_like),
            )),
            pair(space0, eof),
        ),
        |(name, threshold, min, max)| DataLine {
            name,
            threshold,
            min,
            max,
        },
    )(input)
}

/// Extracts a record; anything after the third number is ignored.
pub fn record_fields(input: &str) -> IResult<&str, RecordFields<'_>> {
    map(
        tuple((
            preceded(space0, name),
            preceded(space1, number),
            preceded(space1, number),
            preceded(space1, number),
        )),
        |(name, threshold, min, max)| RecordFields {
            name,
            threshold,
            min,
            max,
        },
    )(input)
}

/// Extracts `<name> <count>` followed by exactly `count` numbers; anything
/// after them is ignored.
pub fn weight_line(input: &str) -> IResult<&str, WeightLine<'_>> {
    let (rest, (name, n)) = pair(
        preceded(space0, name),
        preceded(space1, map_res(digit1, |s: &str| s.parse::<usize>())),
    )(input)?;
    let (rest, scales) = count(preceded(space1, number), n)(rest)?;
    Ok((rest, WeightLine { name, scales }))
}
