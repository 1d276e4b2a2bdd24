//! Test fixtures for building spreadsheet documents.

use rust_xlsxwriter::Workbook;

/// Build an xlsx workbook. Cells that parse as numbers are written as numbers,
/// `TRUE`/`FALSE` as booleans, and empty strings are left blank.
#[allow(dead_code)]
pub fn xlsx(sheets: &[(&str, Vec<Vec<&str>>)]) -> Vec<u8> {
    let mut workbook = Workbook::new();
    for (name, rows) in sheets {
        let worksheet = workbook.add_worksheet();
        worksheet.set_name(*name).unwrap();
        for (r, row) in rows.iter().enumerate() {
            for (c, cell) in row.iter().enumerate() {
                let (r, c) = (r as u32, c as u16);
                if cell.is_empty() {
                    continue;
                } else if let Ok(n) = cell.parse::<f64>() {
                    worksheet.write_number(r, c, n).unwrap();
                } else if *cell == "TRUE" || *cell == "FALSE" {
                    worksheet.write_boolean(r, c, *cell == "TRUE").unwrap();
                } else {
                    worksheet.write_string(r, c, *cell).unwrap();
                }
            }
        }
    }
    workbook.save_to_buffer().unwrap()
}

/// Build a CSV document with a header and `rows` generated data rows.
#[allow(dead_code)]
pub fn generated_csv(rows: usize, edit: impl Fn(usize) -> Option<f64>) -> Vec<u8> {
    let mut out = String::with_capacity(rows * 32);
    out.push_str("Id,Name,Amount,Tax\n");
    for i in 0..rows {
        let tax = edit(i).unwrap_or((i % 1000) as f64 + 0.5);
        out.push_str(&format!("{i},name-{i},{},{tax}\n", i * 3));
    }
    out.into_bytes()
}
