use winnow::{
    Result as WResult,
    ascii::{float, space0, space1},
    combinator::{alt, delimited, opt, preceded, separated_pair},
    prelude::*,
    token::take_while,
};

use super::{
    Label,
    instruction::{Angle, Coincident, DeclareLine, DeclarePoint, Distance, Instruction},
};

/// Parses one trimmed line.
pub(super) fn instruction(i: &mut &str) -> WResult<Instruction> {
    alt((
        Distance::parse.map(Instruction::Distance),
        Angle::parse.map(Instruction::Angle),
        Coincident::parse.map(Instruction::Coincident),
        declaration,
    ))
    .parse_next(i)
}

// [fixed] point p (0, 0)
// [fixed] line l (0, 1, 0)
fn declaration(i: &mut &str) -> WResult<Instruction> {
    let fixed = opt(("fixed", space1)).map(|f| f.is_some()).parse_next(i)?;
    alt((
        ("point", space1, Label::parse, space0, coordinates).map(move |(_, _, label, _, (x, y))| {
            Instruction::DeclarePoint(DeclarePoint { label, fixed, x, y })
        }),
        ("line", space1, Label::parse, space0, coefficients).map(move |(_, _, label, _, coefficients)| {
            Instruction::DeclareLine(DeclareLine {
                label,
                fixed,
                coefficients,
            })
        }),
    ))
    .parse_next(i)
}

impl Distance {
    // distance(p, q) = 4
    fn parse(i: &mut &str) -> WResult<Self> {
        ("distance", space0, pair, equals, number)
            .map(|(_, _, label, _, distance)| Self { label, distance })
            .parse_next(i)
    }
}

impl Angle {
    // angle(l, m) = 108deg
    fn parse(i: &mut &str) -> WResult<Self> {
        let (_, _, label, _, value) = ("angle", space0, pair, equals, number).parse_next(i)?;
        let degrees = opt(preceded(space0, alt(("deg".value(true), "rad".value(false)))))
            .map(|unit| unit.unwrap_or(false))
            .parse_next(i)?;
        let radians = if degrees { value.to_radians() } else { value };
        Ok(Self { label, radians })
    }
}

impl Coincident {
    // coincident(p, q)
    fn parse(i: &mut &str) -> WResult<Self> {
        ("coincident", space0, pair)
            .map(|(_, _, label)| Self { label })
            .parse_next(i)
    }
}

impl Label {
    fn parse(i: &mut &str) -> WResult<Label> {
        take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '_')
            .map(|s: &str| Label(s.to_owned()))
            .parse_next(i)
    }
}

fn pair(i: &mut &str) -> WResult<(Label, Label)> {
    delimited(
        ('(', space0),
        separated_pair(Label::parse, comma, Label::parse),
        (space0, ')'),
    )
    .parse_next(i)
}

fn coordinates(i: &mut &str) -> WResult<(f64, f64)> {
    delimited(('(', space0), separated_pair(number, comma, number), (space0, ')')).parse_next(i)
}

fn coefficients(i: &mut &str) -> WResult<[f64; 3]> {
    delimited(('(', space0), (number, comma, number, comma, number), (space0, ')'))
        .map(|(a, _, b, _, c)| [a, b, c])
        .parse_next(i)
}

fn comma(i: &mut &str) -> WResult<()> {
    (space0, ',', space0).void().parse_next(i)
}

fn equals(i: &mut &str) -> WResult<()> {
    (space0, '=', space0).void().parse_next(i)
}

fn number(i: &mut &str) -> WResult<f64> {
    float.parse_next(i)
}
