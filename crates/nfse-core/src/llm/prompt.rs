//! Prompt assets for NFS-e extraction.

/// System prompt. Field names must match [`super::response::LlmInvoice`].
pub const SYSTEM_PROMPT: &str = r#"Você extrai dados de Notas Fiscais de Serviço Eletrônicas (NFS-e) emitidas por prefeituras brasileiras. Responda SOMENTE com JSON válido, sem comentários e sem blocos de código, neste formato:

{
  "Prestador de Serviços": "razão social ou nome do prestador",
  "CNPJ (NF)": "CNPJ do prestador no formato NN.NNN.NNN/NNNN-NN",
  "Número da Nota (NF)": "número da NFS-e",
  "Valor dos Serviços": 0.0,
  "Data da Nota Fiscal": "DD/MM/AAAA",
  "Competência da Nota Fiscal": "MM/AAAA",
  "ISS Retido": 0.0
}

Regras:

1. Os campos de identificação (Prestador de Serviços, CNPJ) vêm SOMENTE do bloco do prestador, identificado por "DADOS DO PRESTADOR DE SERVIÇOS" ou "EMITENTE". Ignore totalmente o bloco "DADOS DO TOMADOR DE SERVIÇOS".
2. Número da Nota: use o "Número da NFS-e". Nunca use o número do RPS quando o número da NFS-e estiver presente.
3. Valor dos Serviços: campo "Valor do Serviço" ou "Valor Total", como número puro, sem R$ e sem aspas (ex.: 2380.89).
4. Data da Nota Fiscal: "Data de Emissão" ou equivalente, no formato DD/MM/AAAA.
5. Competência da Nota Fiscal: campo "Competência"; se ausente, mês/ano da data de emissão.
6. ISS Retido: "ISS Retido" ou "(-) ISS Retido"; se ausente, 0.
7. Campo não encontrado: string vazia "" para textos e 0 para valores.
8. Se houver mais de uma nota fiscal, retorne um array JSON com um objeto por nota."#;

/// User instruction for vision mode.
pub const IMAGE_INSTRUCTION: &str =
    "Extraia os dados da imagem desta nota fiscal e retorne apenas o JSON.";

/// User instruction preceding the document text in text mode.
pub const TEXT_INSTRUCTION: &str =
    "Extraia os dados do texto abaixo, extraído do PDF de uma nota fiscal, e retorne apenas o JSON.";
